//! `rtcache-origin`: the demo endpoint the client polls.

use clap::Parser;
use rtcache::background::shutdown_signal;
use rtcache::server::{Server, ServerError, greet};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Demo origin server answering every request with \"You got here\"")]
struct CliArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000")]
    addr: String,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();
    init_logging(args.verbose)?;

    let server = Server::bind(&args.addr).await?;
    server.run_until(greet, shutdown_signal()).await?;
    Ok(())
}

fn init_logging(verbose: bool) -> Result<(), AppError> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
