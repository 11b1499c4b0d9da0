mod commands;
mod config;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use saga_store_fs::FsSagaStore;
use tracing_subscriber::EnvFilter;

use crate::commands::Commands;
use crate::config::{InspectConfig, STORE_DIR_ENV, resolve_store_dir};
use crate::error::{CliError, Result};

#[derive(Parser)]
#[command(name = "saga-inspect")]
#[command(about = "Inspect sagas kept by the file-backed saga store", long_about = None)]
struct Cli {
    /// Saga store directory (default: config file, then $SAGA_STORE_DIR, then .sagas)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Config file (default: saga-inspect.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let config = InspectConfig::load(cli.config.as_deref())?;
    let env = std::env::var_os(STORE_DIR_ENV).map(PathBuf::from);
    let store_dir = resolve_store_dir(cli.store, &config, env);
    tracing::debug!(store = %store_dir.display(), "using saga store");

    let store = FsSagaStore::new(store_dir);
    cli.command.execute(&store).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_error(error: &CliError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("caused by: {cause}");
        source = std::error::Error::source(cause);
    }
}
