//! Configuration module for the casting agency service
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::auth::{MissingPermissionsPolicy, ValidatorConfig};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Upper bound for `auth.leeway_seconds`
pub const MAX_LEEWAY_SECONDS: u64 = 300;

/// Algorithms a JWKS public key can verify
const ASYMMETRIC_ALGORITHMS: &[&str] = &[
    "RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384",
];

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Server address cannot be empty".into(),
            ));
        }

        self.auth.validate()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_server_address(),
        }
    }
}

fn default_server_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Token authorization configuration
///
/// # Example
///
/// ```yaml
/// auth:
///   issuer: "https://tenant.auth0.com/"
///   audience: "casting-agency"
///   jwks_url: "${JWKS_URL}"
///   algorithm: "RS256"
///   missing_permissions: "reject"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Expected `iss`, compared exactly (Auth0 issuers end with a slash)
    pub issuer: String,
    /// Audience the token must be issued for
    pub audience: String,
    /// Provider JWKS endpoint
    pub jwks_url: String,
    /// The single accepted signing algorithm. Default: RS256
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    /// Clock skew tolerance for `exp`/`nbf`. Default: 0
    #[serde(default)]
    pub leeway_seconds: u64,
    /// JWKS fetch timeout. Default: 5
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// Claim holding the granted permissions. Default: "permissions"
    #[serde(default = "default_permissions_claim")]
    pub permissions_claim: String,
    /// What to do when a token has no permission claim. Default: reject
    #[serde(default)]
    pub missing_permissions: MissingPermissionsPolicy,
}

impl AuthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.issuer cannot be empty".into(),
            ));
        }

        if self.audience.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.audience cannot be empty".into(),
            ));
        }

        if !is_valid_http_url(&self.jwks_url) {
            return Err(ConfigError::ValidationError(
                "Invalid auth.jwks_url: must start with http:// or https://".into(),
            ));
        }

        if !ASYMMETRIC_ALGORITHMS.contains(&self.algorithm.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid auth.algorithm '{}': must be one of {}",
                self.algorithm,
                ASYMMETRIC_ALGORITHMS.join(", ")
            )));
        }

        if self.leeway_seconds > MAX_LEEWAY_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "auth.leeway_seconds must be at most {}",
                MAX_LEEWAY_SECONDS
            )));
        }

        if self.fetch_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "auth.fetch_timeout_seconds must be greater than 0".into(),
            ));
        }

        if self.permissions_claim.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.permissions_claim cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Parsed signing algorithm
    pub fn algorithm(&self) -> Result<Algorithm, ConfigError> {
        self.algorithm.parse().map_err(|_| {
            ConfigError::ValidationError(format!("Unknown algorithm '{}'", self.algorithm))
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// Validator settings for these options
    pub fn validator_config(&self) -> Result<ValidatorConfig, ConfigError> {
        Ok(
            ValidatorConfig::new(&self.issuer, &self.audience, self.algorithm()?)
                .with_leeway(self.leeway_seconds)
                .with_permissions_claim(&self.permissions_claim),
        )
    }
}

fn default_algorithm() -> String {
    "RS256".to_string()
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_permissions_claim() -> String {
    crate::auth::jwt::DEFAULT_PERMISSIONS_CLAIM.to_string()
}

/// Catalog configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Start with the demo actors and movies. Default: false
    #[serde(default)]
    pub seed_demo_data: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}
