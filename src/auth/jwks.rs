//! JWKS (JSON Web Key Set) resolution
//!
//! Fetches the identity provider's signing keys and caches them process-wide.
//! The cache is refreshed only when a token names a key id it does not
//! contain; there is no background timer.
//!
//! # Refresh protocol
//!
//! ```text
//! resolve(kid)
//!   → read cache (shared lock)         hit → key
//!   → miss: take refresh lock
//!       another fetch finished while we waited? → reuse its outcome
//!       otherwise fetch once, swap the cache
//!   → read cache again                 hit → key, miss → UnknownSigningKey
//! ```
//!
//! Lookups of cached keys only take the cache read lock, so they never wait
//! on a fetch in progress. The write lock is held just long enough to swap
//! the `Arc<KeySet>`.
//!
//! # Example
//!
//! ```no_run
//! use casting_agency::auth::jwks::KeySetResolver;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = KeySetResolver::remote(
//!     "https://tenant.auth0.com/.well-known/jwks.json",
//!     Duration::from_secs(5),
//! )?;
//! let key = resolver.resolve("my-key-id").await?;
//! # Ok(())
//! # }
//! ```

use super::{AuthFailure, AuthFailureKind};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Default timeout for a JWKS fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Key set fetch/parse errors
///
/// These never reach clients; the resolver logs them and reports
/// [`AuthFailureKind::KeySetUnavailable`].
#[derive(Error, Debug)]
pub enum KeySetError {
    #[error("JWKS request failed: {0}")]
    Request(String),

    #[error("JWKS request timed out")]
    Timeout,

    #[error("JWKS endpoint returned HTTP {0}")]
    Status(u16),

    #[error("Invalid JWKS document: {0}")]
    Parse(String),

    #[error("Invalid JWK: {0}")]
    InvalidKey(String),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Public key parameters, keyed by `kty`
///
/// Missing parameters deserialize as `None` so one bad entry only drops
/// that key, not the whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kty")]
pub enum KeyMaterial {
    #[serde(rename = "RSA")]
    Rsa { n: Option<String>, e: Option<String> },

    #[serde(rename = "EC")]
    Ec {
        crv: Option<String>,
        x: Option<String>,
        y: Option<String>,
    },

    /// `oct`, `OKP` and anything else; never usable for RS/PS/ES tokens
    #[serde(other)]
    Unsupported,
}

/// One entry of the provider's key set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(flatten)]
    pub material: KeyMaterial,
}

/// ECDSA algorithm implied by a JWK curve name
fn curve_algorithm(crv: &str) -> Option<Algorithm> {
    match crv {
        "P-256" => Some(Algorithm::ES256),
        "P-384" => Some(Algorithm::ES384),
        _ => None,
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, KeySetError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| KeySetError::InvalidKey(format!("missing `{}`", name)))
}

impl Jwk {
    /// Build the verification key
    ///
    /// EC keys must name a supported curve, and the curve must agree with
    /// a pinned `alg`.
    pub fn to_decoding_key(&self) -> Result<DecodingKey, KeySetError> {
        match &self.material {
            KeyMaterial::Rsa { n, e } => {
                if let Some(alg) = self.pinned_algorithm() {
                    if !is_rsa(alg) {
                        return Err(KeySetError::InvalidKey(format!(
                            "RSA key pinned to {:?}",
                            alg
                        )));
                    }
                }
                DecodingKey::from_rsa_components(required(n, "n")?, required(e, "e")?)
                    .map_err(|e| KeySetError::InvalidKey(e.to_string()))
            }
            KeyMaterial::Ec { crv, x, y } => {
                let crv = required(crv, "crv")?;
                let implied = curve_algorithm(crv).ok_or_else(|| {
                    KeySetError::InvalidKey(format!("unsupported curve {}", crv))
                })?;
                if let Some(alg) = self.pinned_algorithm() {
                    if alg != implied {
                        return Err(KeySetError::InvalidKey(format!(
                            "curve {} does not match {:?}",
                            crv, alg
                        )));
                    }
                }
                DecodingKey::from_ec_components(required(x, "x")?, required(y, "y")?)
                    .map_err(|e| KeySetError::InvalidKey(e.to_string()))
            }
            KeyMaterial::Unsupported => {
                Err(KeySetError::InvalidKey("unsupported key type".into()))
            }
        }
    }

    /// Algorithm this key may verify, if it is constrained to one
    ///
    /// A pinned `alg` wins; otherwise EC keys are bound to their curve's
    /// algorithm. RSA keys without `alg` accept any RS/PS variant.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.pinned_algorithm().or_else(|| match &self.material {
            KeyMaterial::Ec { crv, .. } => crv.as_deref().and_then(curve_algorithm),
            _ => None,
        })
    }

    fn pinned_algorithm(&self) -> Option<Algorithm> {
        self.alg.as_deref().and_then(|alg| alg.parse().ok())
    }

    fn key_type(&self) -> &'static str {
        match self.material {
            KeyMaterial::Rsa { .. } => "RSA",
            KeyMaterial::Ec { .. } => "EC",
            KeyMaterial::Unsupported => "unsupported",
        }
    }

    /// Keys marked for encryption are never used to verify signatures
    fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().map_or(true, |u| u == "sig")
    }
}

fn is_rsa(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

/// JSON Web Key Set document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// A provider public key, ready for signature verification
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub algorithm: Option<Algorithm>,
    pub key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Immutable snapshot of the provider's keys
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Option<DateTime<Utc>>,
}

impl KeySet {
    /// Build a key set from a JWKS document
    ///
    /// Keys without a `kid`, encryption keys and keys that cannot be decoded
    /// are skipped.
    pub fn from_jwks(jwks: Jwks) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());

        for jwk in jwks.keys {
            let kid = match jwk.kid.as_deref() {
                Some(kid) if !kid.is_empty() => kid.to_string(),
                _ => {
                    debug!(kty = jwk.key_type(), "Skipping JWK without kid");
                    continue;
                }
            };

            if !jwk.is_signing_key() {
                debug!(kid = %kid, "Skipping non-signing JWK");
                continue;
            }

            match jwk.to_decoding_key() {
                Ok(key) => {
                    keys.insert(
                        kid.clone(),
                        Arc::new(SigningKey {
                            kid,
                            algorithm: jwk.algorithm(),
                            key,
                        }),
                    );
                }
                Err(e) => warn!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }

        Self {
            keys,
            fetched_at: Some(Utc::now()),
        }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids in this set, sorted
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.keys.keys().cloned().collect();
        kids.sort();
        kids
    }

    /// When this set was built (`None` for the empty initial set)
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }
}

/// Where keys come from
enum KeySource {
    Remote {
        endpoint: String,
        client: reqwest::Client,
    },
    /// Fixed keys supplied up front; refreshes are no-ops
    Static,
}

/// Outcome of the most recent completed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshOutcome {
    Never,
    Refreshed,
    Failed,
}

/// Shared, lazily populated signing key cache
///
/// Safe to share across request tasks behind an `Arc`.
pub struct KeySetResolver {
    source: KeySource,
    cache: RwLock<Arc<KeySet>>,
    refresh: Mutex<RefreshOutcome>,
    /// Completed fetch attempts (successful or not)
    attempts: AtomicU64,
}

impl KeySetResolver {
    /// Create a resolver that fetches keys from a JWKS endpoint on first use
    pub fn remote(endpoint: &str, timeout: Duration) -> Result<Self, KeySetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeySetError::Client(e.to_string()))?;

        Ok(Self {
            source: KeySource::Remote {
                endpoint: endpoint.to_string(),
                client,
            },
            cache: RwLock::new(Arc::new(KeySet::default())),
            refresh: Mutex::new(RefreshOutcome::Never),
            attempts: AtomicU64::new(0),
        })
    }

    /// Create a resolver over fixed keys
    pub fn from_jwks(jwks: Jwks) -> Self {
        Self {
            source: KeySource::Static,
            cache: RwLock::new(Arc::new(KeySet::from_jwks(jwks))),
            refresh: Mutex::new(RefreshOutcome::Refreshed),
            attempts: AtomicU64::new(0),
        }
    }

    /// JWKS endpoint, if keys are fetched remotely
    pub fn endpoint(&self) -> Option<&str> {
        match &self.source {
            KeySource::Remote { endpoint, .. } => Some(endpoint),
            KeySource::Static => None,
        }
    }

    /// Number of completed fetch attempts
    pub fn fetch_count(&self) -> u64 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Current key set snapshot
    pub async fn snapshot(&self) -> Arc<KeySet> {
        Arc::clone(&*self.cache.read().await)
    }

    /// Fetch the key set now unless a fetch already happened
    ///
    /// Used to warm the cache at startup.
    pub async fn preload(&self) -> Result<usize, AuthFailure> {
        if self.fetch_count() == 0 {
            self.refresh(0).await?;
        }
        Ok(self.snapshot().await.len())
    }

    /// Resolve a key id to a signing key
    ///
    /// A miss triggers at most one refresh before giving up with
    /// `UnknownSigningKey`.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, AuthFailure> {
        let observed = self.attempts.load(Ordering::Acquire);

        if let Some(key) = self.cached(kid).await {
            return Ok(key);
        }

        debug!(kid = %kid, "Signing key not cached, refreshing key set");
        self.refresh(observed).await?;

        self.cached(kid).await.ok_or_else(|| {
            warn!(kid = %kid, "Token signed with unknown key");
            AuthFailure::new(
                AuthFailureKind::UnknownSigningKey,
                "Unable to find the appropriate key.",
            )
        })
    }

    async fn cached(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.cache.read().await.get(kid)
    }

    /// Refresh the cache unless another fetch completed after `observed`
    async fn refresh(&self, observed: u64) -> Result<(), AuthFailure> {
        let (endpoint, client) = match &self.source {
            KeySource::Remote { endpoint, client } => (endpoint, client),
            KeySource::Static => return Ok(()),
        };

        let mut last = self.refresh.lock().await;

        // Someone else fetched while we were waiting for the lock
        if self.attempts.load(Ordering::Acquire) != observed {
            return match *last {
                RefreshOutcome::Failed => Err(key_set_unavailable()),
                _ => Ok(()),
            };
        }

        let result = fetch_jwks(client, endpoint).await;
        crate::metrics::record_jwks_fetch(result.is_ok());

        let outcome = match result {
            Ok(jwks) => {
                let key_set = Arc::new(KeySet::from_jwks(jwks));
                info!(
                    endpoint = %endpoint,
                    keys = key_set.len(),
                    "Refreshed signing key set"
                );
                *self.cache.write().await = key_set;
                Ok(())
            }
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Failed to fetch signing key set");
                Err(key_set_unavailable())
            }
        };

        *last = if outcome.is_ok() {
            RefreshOutcome::Refreshed
        } else {
            RefreshOutcome::Failed
        };
        self.attempts.fetch_add(1, Ordering::AcqRel);

        outcome
    }
}

fn key_set_unavailable() -> AuthFailure {
    AuthFailure::new(
        AuthFailureKind::KeySetUnavailable,
        "Unable to verify token: signing keys are unavailable.",
    )
}

/// Fetch JWKS from endpoint
async fn fetch_jwks(client: &reqwest::Client, endpoint: &str) -> Result<Jwks, KeySetError> {
    let response = client
        .get(endpoint)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(request_error)?;

    if !response.status().is_success() {
        return Err(KeySetError::Status(response.status().as_u16()));
    }

    let body = response.bytes().await.map_err(request_error)?;
    serde_json::from_slice(&body).map_err(|e| KeySetError::Parse(e.to_string()))
}

fn request_error(e: reqwest::Error) -> KeySetError {
    if e.is_timeout() {
        KeySetError::Timeout
    } else {
        KeySetError::Request(e.to_string())
    }
}
