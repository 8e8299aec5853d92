//! Casting Agency Library
//!
//! Actor and movie catalog API protected by bearer tokens from an external
//! identity provider.
//!
//! # Features
//!
//! - **JWKS-backed validation**: provider keys fetched on demand and cached
//! - **Single algorithm allowlist**: `none` and HMAC substitution are rejected
//! - **Permission per route**: each operation declares one required permission
//! - **Prometheus metrics**: auth decisions, key fetches, HTTP traffic
//!
//! # Example
//!
//! ```no_run
//! use casting_agency::{config::Config, server::{AppState, Server}};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let state = AppState::from_config(&config)?;
//!     let server = Server::bind(&config.server.address, state).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod catalog;
pub mod config;
pub mod metrics;
pub mod router;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
