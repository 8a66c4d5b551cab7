use anyhow::Result;
use clap::Args;
use futures::TryStreamExt;

use volumes_core::entry::Raw;

use super::Context;
use crate::progress::format_bytes;

#[derive(Args)]
pub struct LsArgs {
    /// Only list paths starting with this prefix
    #[arg(default_value = "")]
    prefix: String,

    /// Show sizes
    #[arg(short, long)]
    long: bool,

    /// Print each entry's backend metadata as a JSON line
    #[arg(long, conflicts_with = "long")]
    json: bool,
}

pub async fn run(ctx: &Context, args: LsArgs) -> Result<()> {
    let volume = ctx.volume()?;
    let mut entries = volume.list(&args.prefix, ctx.params());
    let mut count = 0u64;
    let mut total = 0u64;

    while let Some(entry) = entries.try_next().await? {
        count += 1;
        let size = size_of(&entry.raw);
        total += size.unwrap_or(0);

        if args.json {
            let line = serde_json::json!({ "path": entry.path, "raw": entry.raw });
            println!("{line}");
        } else if args.long {
            let size = size.map(format_bytes).unwrap_or_else(|| "-".to_string());
            println!("{size:>10}  {}", entry.path);
        } else {
            println!("{}", entry.path);
        }
    }

    if args.long {
        println!("{count} files, {}", format_bytes(total));
    }
    Ok(())
}

fn size_of(raw: &Raw) -> Option<u64> {
    match raw {
        Raw::File(meta) => Some(meta.len),
        Raw::Object(info) => info.size,
        Raw::None | Raw::Missing(_) => None,
    }
}
