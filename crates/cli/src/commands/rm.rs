use anyhow::Result;
use clap::Args;

use super::Context;

#[derive(Args)]
pub struct RmArgs {
    /// File or directory to remove
    path: String,
}

pub async fn run(ctx: &Context, args: RmArgs) -> Result<()> {
    let removed = ctx.volume()?.remove(&args.path, ctx.params()).await?;
    match removed.deleted {
        Some(true) => println!("Removed {}", args.path),
        Some(false) => println!("Nothing to remove at {}", args.path),
        None => println!("Removed {} (if it existed)", args.path),
    }
    Ok(())
}
