use anyhow::{Result, anyhow};
use clap::Args;
use tokio::io::AsyncWriteExt;

use volumes_core::ReadOptions;
use volumes_core::entry::{Encoding, Payload};

use super::Context;

#[derive(Args)]
pub struct CatArgs {
    /// Path relative to the volume root
    path: String,

    /// Write the raw bytes instead of decoded text
    #[arg(long)]
    bytes: bool,

    /// Text encoding: utf-8, latin1 or hex
    #[arg(long, default_value = "utf-8")]
    encoding: String,
}

pub async fn run(ctx: &Context, args: CatArgs) -> Result<()> {
    let encoding: Encoding = args.encoding.parse().map_err(|e: String| anyhow!(e))?;
    let options = ReadOptions {
        as_bytes: args.bytes,
        encoding,
        params: ctx.params(),
    };

    let entry = ctx.volume()?.read(&args.path, options).await?;
    match entry.content {
        Some(Payload::Text(text)) => println!("{text}"),
        Some(Payload::Bytes(bytes)) => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
        None => {}
    }
    Ok(())
}
