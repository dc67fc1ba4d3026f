//! `rtcache-client`: polls an origin through the caching transport, clearing
//! the cache periodically, until SIGTERM/SIGHUP/Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rtcache::background::{ConfigError, Scheduler, SchedulerConfig, shutdown_signal};
use rtcache::cache::KeyPolicy;
use rtcache::http::Request;
use rtcache::transport::CachingTransport;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    version,
    about = "Poll an HTTP endpoint through a self-invalidating response cache"
)]
struct CliArgs {
    /// URL to request on every tick
    #[arg(long)]
    url: Option<String>,

    /// Milliseconds between requests
    #[arg(long)]
    request_interval_ms: Option<u64>,

    /// Milliseconds between cache clears (must exceed the request interval)
    #[arg(long)]
    clear_interval_ms: Option<u64>,

    /// Overall per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Cache key policy: "url" or "method-and-url"
    #[arg(long)]
    key_policy: Option<KeyPolicy>,

    /// JSON config file; explicit flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shape of the optional JSON config file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    url: Option<String>,
    key_policy: Option<KeyPolicy>,
    #[serde(flatten)]
    scheduler: SchedulerConfig,
}

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    ParseConfig(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

const DEFAULT_URL: &str = "http://localhost:8000/";

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

    let file = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| AppError::ReadConfig {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw)?
        }
        None => FileConfig::default(),
    };

    let mut config = file.scheduler;
    if let Some(ms) = args.request_interval_ms {
        config.request_interval_ms = ms;
    }
    if let Some(ms) = args.clear_interval_ms {
        config.clear_interval_ms = ms;
    }
    if let Some(ms) = args.timeout_ms {
        config.request_timeout_ms = ms;
    }
    let key_policy = args.key_policy.or(file.key_policy).unwrap_or_default();
    let url = args.url.or(file.url).unwrap_or_else(|| DEFAULT_URL.to_owned());

    let request = Request::get(&url)?;
    let transport = Arc::new(CachingTransport::http().with_key_policy(key_policy));
    let mut scheduler = Scheduler::new(Arc::clone(&transport), request, config)?;

    let summary = scheduler.run(shutdown_signal()).await;
    let stats = transport.stats();
    info!(
        requests = summary.requests,
        failures = summary.failures,
        clears = summary.clears,
        hits = stats.hits,
        misses = stats.misses,
        "client finished"
    );
    if summary.requests > 0 && summary.failures == summary.requests {
        error!(%url, "every request failed; is the origin running?");
    }
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
