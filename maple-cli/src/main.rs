use clap::Parser;
use tracing::{Level, debug, error};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod commands;
mod error;
mod utils;

use cli::{CliArgs, Command};
use error::AppError;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG wins over the verbosity flag
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(format!("Failed to set up logging: {e}")))?;

    debug!("Verbose logging enabled");

    let max_age = utils::parse_age(&args.max_age)?;

    match &args.command {
        Command::Fetch(fetch_args) => commands::fetch(&args, fetch_args, max_age).await,
        Command::Clear { scope } => commands::clear(&args, max_age, (*scope).into()).await,
        Command::Expired => commands::expired(&args, max_age).await,
        Command::Sweep => commands::sweep(&args, max_age).await,
    }
}
