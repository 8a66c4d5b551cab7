use anyhow::Result;
use clap::Args;

use super::Context;

#[derive(Args)]
pub struct ExistsArgs {
    /// Path relative to the volume root
    path: String,
}

pub async fn run(ctx: &Context, args: ExistsArgs) -> Result<()> {
    let found = ctx.volume()?.exists(&args.path, ctx.params()).await?;
    println!("{}", found.exists);
    Ok(())
}
