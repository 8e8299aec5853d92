//! HTTP server module
//!
//! Accepts HTTP/1.1 connections and serves the casting API. Each connection
//! runs in its own task; handlers share an [`AppState`].
//!
//! # Example
//!
//! ```no_run
//! use casting_agency::config::Config;
//! use casting_agency::server::{AppState, Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let state = AppState::from_config(&config)?;
//! let server = Server::bind(&config.server.address, state).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod handlers;

use crate::auth::{AuthGuard, KeySetResolver, PermissionChecker, TokenValidator};
use crate::catalog::Catalog;
use crate::config::Config;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Invalid server setup: {0}")]
    SetupError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub guard: AuthGuard,
    pub catalog: Catalog,
}

impl AppState {
    pub fn new(guard: AuthGuard, catalog: Catalog) -> Self {
        Self { guard, catalog }
    }

    /// Build the guard and catalog described by `config`
    ///
    /// Keys are not fetched here; the first token (or an explicit preload)
    /// triggers the fetch.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let resolver = KeySetResolver::remote(&config.auth.jwks_url, config.auth.fetch_timeout())
            .map_err(|e| ServerError::SetupError(e.to_string()))?;
        let validator_config = config
            .auth
            .validator_config()
            .map_err(|e| ServerError::SetupError(e.to_string()))?;

        let validator = TokenValidator::new(validator_config, Arc::new(resolver));
        let guard = AuthGuard::new(
            Arc::new(validator),
            PermissionChecker::new(config.auth.missing_permissions),
        );

        let catalog = if config.catalog.seed_demo_data {
            Catalog::with_demo_data()
        } else {
            Catalog::new()
        };

        Ok(Self::new(guard, catalog))
    }
}

/// Casting API HTTP server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to `address`; port 0 lets the OS pick a port
    pub async fn bind(address: &str, state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address {}: {}", address, e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!(address = %local_addr, "Server bound");

        Ok(Self {
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    /// The address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes
    ///
    /// Connections already accepted finish in their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!(address = %self.local_addr, "Starting casting agency server");
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handlers::handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer_addr, error = %e, "Connection closed with error");
                }
            });
        }

        info!("Shutting down server");
        Ok(())
    }
}
