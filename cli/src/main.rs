mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{ls::LsCommand, snapshots::SnapshotsCommand};
use config::CliConfig;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "tidesnap",
    about = "Browse deduplicated, encrypted backup snapshots",
    long_about = "Tidesnap resolves snapshots in a content-addressed backup repository and lists the files they contain"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "TIDESNAP_REPO", help = "Repository path or s3:<bucket>/<prefix>")]
    repo: Option<String>,

    #[arg(long, global = true, env = "TIDESNAP_PASSWORD", hide_env_values = true, help = "Repository password")]
    password: Option<String>,

    #[arg(long, global = true, help = "Config file (defaults to the per-user config.toml)")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List files in a snapshot")]
    Ls(LsCommand),

    #[command(about = "List snapshots")]
    Snapshots(SnapshotsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet)?;

    let config = CliConfig::load(cli.config.as_deref())?;
    debug!(config = ?cli.config, "Configuration loaded");

    match cli.command {
        Commands::Ls(ref cmd) => cmd.run(&cli, &config).await,
        Commands::Snapshots(ref cmd) => cmd.run(&cli, &config).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tidesnap={level},tidesnap_core={level},tidesnap_backends={level}")));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
