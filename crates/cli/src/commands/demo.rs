use anyhow::{Result, ensure};
use clap::Args;
use futures::TryStreamExt;
use tracing::info;

use volumes_core::{Content, CopyOptions, MoveOptions, ReadOptions, Volume, WriteOptions};

use super::Context;
use crate::progress;

#[derive(Args)]
pub struct DemoArgs {
    /// Directory inside the volume the demo files are written to
    #[arg(long, default_value = "volumes-demo")]
    dir: String,

    /// Text written to the first file
    #[arg(long, default_value = "hello")]
    content: String,

    /// Leave the demo files in place
    #[arg(long)]
    keep: bool,
}

pub async fn run(ctx: &Context, args: DemoArgs) -> Result<()> {
    let volume = ctx.volume()?;
    let dir = args.dir.trim_matches('/');
    let original = format!("{dir}/testing.txt");
    let duplicate = format!("{dir}/dup.txt");
    let moved = format!("{dir}/retesting.txt");

    info!(volume = ctx.volume_name(), protocol = volume.protocol(), "running demo");

    let spinner = progress::create_spinner(&format!("Writing {original}..."));
    let before = volume.exists(&original, ctx.params()).await?.exists;
    volume
        .write(
            &original,
            Content::from(args.content.as_str()),
            WriteOptions {
                params: ctx.params(),
                ..WriteOptions::default()
            },
        )
        .await?;
    ensure!(volume.exists(&original, ctx.params()).await?.exists, "{original} missing after write");
    spinner.finish_with_message(format!("Wrote {original} (existed before: {before})"));

    let text = read_text(ctx, volume.as_ref(), &original).await?;
    ensure!(text == args.content, "read back {text:?}, expected {:?}", args.content);
    println!("  read {original}: {text:?}");

    volume
        .copy(
            &original,
            &duplicate,
            CopyOptions {
                overwrite: true,
                params: ctx.params(),
            },
        )
        .await?;
    let copied = read_text(ctx, volume.as_ref(), &duplicate).await?;
    ensure!(copied == text, "copy differs from source");
    println!("  copied to {duplicate}: {copied:?}");

    volume.remove(&original, ctx.params()).await?;
    let original_exists = volume.exists(&original, ctx.params()).await?.exists;
    let duplicate_exists = volume.exists(&duplicate, ctx.params()).await?.exists;
    ensure!(!original_exists, "{original} still exists after remove");
    ensure!(duplicate_exists, "{duplicate} disappeared");
    println!("  removed {original}: exists={original_exists}, {duplicate} exists={duplicate_exists}");

    volume
        .rename(
            &duplicate,
            &moved,
            MoveOptions {
                params: ctx.params(),
                ..MoveOptions::default()
            },
        )
        .await?;
    println!("  moved {duplicate} -> {moved}");

    let prefix = format!("{dir}/");
    let listed: Vec<String> = volume
        .list(&prefix, ctx.params())
        .map_ok(|entry| entry.path)
        .try_collect()
        .await?;
    println!("  {prefix} now holds: {}", listed.join(", "));

    if !args.keep {
        for path in &listed {
            volume.remove(path, ctx.params()).await?;
        }
        println!("  cleaned up {} file(s)", listed.len());
    }

    println!("Demo completed on volume {}", ctx.volume_name());
    Ok(())
}

async fn read_text(ctx: &Context, volume: &dyn Volume, path: &str) -> Result<String> {
    let options = ReadOptions {
        params: ctx.params(),
        ..ReadOptions::default()
    };
    let entry = volume.read(path, options).await?;
    Ok(entry
        .content
        .and_then(|c| c.as_text().map(str::to_string))
        .unwrap_or_default())
}
