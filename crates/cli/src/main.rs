mod commands;
mod config;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use volumes_core::RequestParams;

#[derive(Parser)]
#[command(
    name = "vol",
    version,
    about = "Read and write files on local or S3-backed volumes"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Volume to operate on (defaults to the configured default volume)
    #[arg(long, global = true)]
    volume: Option<String>,

    /// Path to volumes.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print failures as JSON
    #[arg(long, global = true)]
    json_errors: bool,

    /// Extra header sent with every object-store request (NAME=VALUE, repeatable)
    #[arg(long = "header", global = true, value_name = "NAME=VALUE", value_parser = parse_pair)]
    headers: Vec<(String, String)>,

    /// Extra query parameter sent with every object-store request (KEY=VALUE, repeatable)
    #[arg(long = "query", global = true, value_name = "KEY=VALUE", value_parser = parse_pair)]
    query: Vec<(String, String)>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (json_errors, verbose) = (cli.json_errors, cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err, json_errors, verbose);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let params = RequestParams {
        headers: cli.headers.into_iter().collect(),
        query: cli.query.into_iter().collect(),
    };
    let ctx = commands::Context::open(cli.config.as_deref(), cli.volume, params)?;

    match cli.command {
        commands::Command::Exists(args) => commands::exists::run(&ctx, args).await,
        commands::Command::Put(args) => commands::put::run(&ctx, args).await,
        commands::Command::Cat(args) => commands::cat::run(&ctx, args).await,
        commands::Command::Cp(args) => commands::transfer::copy(&ctx, args).await,
        commands::Command::Mv(args) => commands::transfer::rename(&ctx, args).await,
        commands::Command::Rm(args) => commands::rm::run(&ctx, args).await,
        commands::Command::Ls(args) => commands::ls::run(&ctx, args).await,
        commands::Command::Volumes => commands::volumes::run(&ctx),
        commands::Command::Demo(args) => commands::demo::run(&ctx, args).await,
    }
}

fn report(err: &anyhow::Error, json: bool, verbose: bool) {
    let storage = err.downcast_ref::<volumes_core::Error>();
    if json {
        let value = match storage {
            Some(storage) => serde_json::to_value(storage.report(verbose)),
            None => Ok(serde_json::json!({
                "message": format!("{err:#}"),
                "code": "ERR_UNKNOWN",
                "status": 500,
                "data": {},
            })),
        };
        match value.and_then(|v| serde_json::to_string_pretty(&v)) {
            Ok(json) => eprintln!("{json}"),
            Err(_) => eprintln!("Error: {err:#}"),
        }
    } else if let Some(storage) = storage {
        // The message already embeds the underlying cause.
        eprintln!("Error [{}]: {storage}", storage.code());
    } else {
        eprintln!("Error: {err:#}");
    }
}
