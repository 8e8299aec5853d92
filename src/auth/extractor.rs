//! Bearer token extraction from the `Authorization` header

use super::{AuthFailure, AuthFailureKind};
use hyper::header::{HeaderMap, AUTHORIZATION};

/// The only accepted authorization scheme (case-sensitive)
pub const BEARER_SCHEME: &str = "Bearer";

/// Extracts the raw bearer token from an `Authorization` header value
pub struct TokenExtractor;

impl TokenExtractor {
    /// Extract the token from a header value, if one was sent
    ///
    /// The header must be exactly `Bearer <token>`; the token is returned
    /// unmodified and is not decoded here.
    pub fn extract(header: Option<&str>) -> Result<&str, AuthFailure> {
        let header = header.ok_or_else(|| {
            AuthFailure::new(
                AuthFailureKind::MissingHeader,
                "Authorization header is expected.",
            )
        })?;

        let parts: Vec<&str> = header.split_ascii_whitespace().collect();
        match parts.len() {
            2 => {}
            0 | 1 => {
                return Err(AuthFailure::new(
                    AuthFailureKind::MalformedHeader,
                    "Authorization header must contain a scheme and a token.",
                ))
            }
            _ => {
                return Err(AuthFailure::new(
                    AuthFailureKind::MalformedHeader,
                    "Authorization header must be a single bearer token.",
                ))
            }
        }

        if parts[0] != BEARER_SCHEME {
            return Err(AuthFailure::new(
                AuthFailureKind::UnsupportedScheme,
                "Authorization header must start with \"Bearer\".",
            ));
        }

        Ok(parts[1])
    }

    /// Extract the token from request headers
    ///
    /// A header value that is not visible ASCII counts as malformed.
    pub fn from_headers(headers: &HeaderMap) -> Result<&str, AuthFailure> {
        let value = match headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| {
                AuthFailure::new(
                    AuthFailureKind::MalformedHeader,
                    "Authorization header contains invalid characters.",
                )
            })?),
            None => None,
        };

        Self::extract(value)
    }
}
