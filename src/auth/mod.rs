//! Authorization module
//!
//! Bearer token authorization backed by an identity provider's JWKS.
//!
//! # Pipeline
//!
//! ```text
//! Authorization header
//!   → extractor  (Bearer <token>)
//!   → jwt        (alg allowlist, signature via jwks, exp/nbf/iss/aud)
//!   → permission (required permission string in the `permissions` claim)
//!   → guard      (runs the protected operation with the decoded claims)
//! ```
//!
//! Every step reports an [`AuthFailure`] carrying an [`AuthFailureKind`]; the
//! HTTP layer turns it into a status code and JSON error envelope.

use std::fmt;
use thiserror::Error;

pub mod extractor;
pub mod guard;
pub mod jwks;
pub mod jwt;
pub mod permission;

pub use extractor::TokenExtractor;
pub use guard::AuthGuard;
pub use jwks::{KeySet, KeySetResolver, SigningKey};
pub use jwt::{DecodedClaims, TokenValidator, ValidatorConfig};
pub use permission::{MissingPermissionsPolicy, PermissionChecker};

/// Classification of an authorization failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailureKind {
    MissingHeader,
    MalformedHeader,
    UnsupportedScheme,
    MalformedToken,
    UnknownSigningKey,
    KeySetUnavailable,
    UnsupportedAlgorithm,
    InvalidSignature,
    TokenExpired,
    TokenNotYetValid,
    IssuerMismatch,
    AudienceMismatch,
    PermissionsClaimMissing,
    PermissionDenied,
}

impl AuthFailureKind {
    /// HTTP status code for this failure
    pub fn status_code(self) -> u16 {
        match self {
            Self::PermissionsClaimMissing => 400,
            Self::PermissionDenied => 403,
            _ => 401,
        }
    }

    /// Stable machine-readable code, used for metrics labels and logs
    pub fn code(self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::MalformedToken => "malformed_token",
            Self::UnknownSigningKey => "unknown_signing_key",
            Self::KeySetUnavailable => "key_set_unavailable",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::InvalidSignature => "invalid_signature",
            Self::TokenExpired => "token_expired",
            Self::TokenNotYetValid => "token_not_yet_valid",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::PermissionsClaimMissing => "permissions_claim_missing",
            Self::PermissionDenied => "permission_denied",
        }
    }

    /// True for the "not authenticated" family (401)
    pub fn is_unauthenticated(self) -> bool {
        self.status_code() == 401
    }
}

impl fmt::Display for AuthFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Authorization failure
///
/// The description is safe to show to clients: it never contains token
/// contents, key material or upstream provider responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{description}")]
pub struct AuthFailure {
    pub kind: AuthFailureKind,
    pub description: String,
}

impl AuthFailure {
    pub fn new(kind: AuthFailureKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// HTTP status code to respond with
    pub fn status(&self) -> u16 {
        self.kind.status_code()
    }
}

/// Permission a protected operation requires (e.g. `get:actors`)
///
/// Declared when the operation is registered, never derived from request data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequiredPermission(&'static str);

impl RequiredPermission {
    pub const GET_ACTORS: Self = Self("get:actors");
    pub const POST_ACTORS: Self = Self("post:actors");
    pub const PATCH_ACTORS: Self = Self("patch:actors");
    pub const DELETE_ACTORS: Self = Self("delete:actors");
    pub const GET_MOVIES: Self = Self("get:movies");
    pub const POST_MOVIES: Self = Self("post:movies");
    pub const PATCH_MOVIES: Self = Self("patch:movies");
    pub const DELETE_MOVIES: Self = Self("delete:movies");

    pub const fn new(permission: &'static str) -> Self {
        Self(permission)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RequiredPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
