use anyhow::Result;
use clap::Args;

use volumes_core::{CopyOptions, MoveOptions};

use super::Context;

#[derive(Args)]
pub struct CopyArgs {
    source: String,
    target: String,

    /// Replace the target if it exists
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
pub struct MoveArgs {
    source: String,
    target: String,

    /// Fail instead of replacing an existing target
    #[arg(long)]
    no_overwrite: bool,
}

pub async fn copy(ctx: &Context, args: CopyArgs) -> Result<()> {
    let options = CopyOptions {
        overwrite: args.overwrite,
        params: ctx.params(),
    };
    ctx.volume()?
        .copy(&args.source, &args.target, options)
        .await?;
    println!("Copied {} -> {}", args.source, args.target);
    Ok(())
}

pub async fn rename(ctx: &Context, args: MoveArgs) -> Result<()> {
    let options = MoveOptions {
        overwrite: !args.no_overwrite,
        params: ctx.params(),
    };
    ctx.volume()?
        .rename(&args.source, &args.target, options)
        .await?;
    println!("Moved {} -> {}", args.source, args.target);
    Ok(())
}
