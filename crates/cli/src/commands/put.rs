use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use volumes_core::{Content, WriteOptions};

use super::Context;
use crate::progress;

#[derive(Args)]
pub struct PutArgs {
    /// Destination path relative to the volume root
    path: String,

    /// Text to store
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,

    /// Local file to upload; stdin is read when neither --text nor --file is given
    #[arg(long)]
    file: Option<PathBuf>,

    /// Content type sent to object stores
    #[arg(long)]
    content_type: Option<String>,
}

pub async fn run(ctx: &Context, args: PutArgs) -> Result<()> {
    let volume = ctx.volume()?;
    let options = WriteOptions {
        content_type: args.content_type,
        params: ctx.params(),
    };

    if let Some(text) = args.text {
        volume.write(&args.path, Content::from(text), options).await?;
    } else if let Some(file) = args.file {
        let source = tokio::fs::File::open(&file)
            .await
            .with_context(|| format!("failed to open {}", file.display()))?;
        let len = source.metadata().await?.len();

        let pb = progress::create_bytes_progress(len, &args.path);
        volume
            .write(&args.path, Content::stream(pb.wrap_async_read(source)), options)
            .await?;
        pb.finish_and_clear();
        info!(
            source = %file.display(),
            size = %progress::format_bytes(len),
            "uploaded"
        );
    } else {
        volume
            .write(&args.path, Content::stream(tokio::io::stdin()), options)
            .await?;
    }

    println!("Wrote {}:{}", ctx.volume_name(), args.path);
    Ok(())
}
