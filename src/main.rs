//! Casting Agency - actor and movie catalog API
//!
//! Loads the configuration, warms the signing key cache and serves the API
//! until Ctrl-C.

use casting_agency::metrics::server::MetricsServer;
use casting_agency::server::{AppState, Server};
use casting_agency::Config;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Casting Agency - actor and movie catalog API
#[derive(Parser, Debug)]
#[command(name = "casting-agency")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Casting Agency v{}", casting_agency::VERSION);

    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let state = AppState::from_config(&config)?;

    // Not fatal: the first token with an unknown kid fetches again
    match state.guard.validator().resolver().preload().await {
        Ok(keys) => info!(keys, "Signing keys loaded"),
        Err(failure) => warn!(error = %failure, "Signing keys unavailable at startup"),
    }

    let mut metrics_server = if config.metrics.enabled {
        let mut server = MetricsServer::new(&format!("0.0.0.0:{}", config.metrics.port));
        server.start().await?;
        Some(server)
    } else {
        None
    };

    let server = Server::bind(&config.server.address, state).await?;
    server.run().await?;

    if let Some(metrics_server) = metrics_server.as_mut() {
        metrics_server.shutdown().await;
    }

    Ok(())
}
