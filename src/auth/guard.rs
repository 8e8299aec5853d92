//! Authorization guard for protected operations
//!
//! Runs extraction, validation and the permission check in order and only
//! invokes the protected operation when all three pass.
//!
//! # Example
//!
//! ```no_run
//! use casting_agency::auth::{AuthGuard, RequiredPermission};
//! use hyper::HeaderMap;
//!
//! # async fn example(guard: AuthGuard, headers: HeaderMap) {
//! let result = guard
//!     .protect(&headers, RequiredPermission::GET_ACTORS, |claims| async move {
//!         format!("hello {:?}", claims.subject)
//!     })
//!     .await;
//! # }
//! ```

use super::extractor::TokenExtractor;
use super::jwt::{DecodedClaims, TokenValidator};
use super::permission::PermissionChecker;
use super::{AuthFailure, RequiredPermission};
use hyper::HeaderMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stateless per request; clones share the validator and its key cache
#[derive(Clone)]
pub struct AuthGuard {
    validator: Arc<TokenValidator>,
    checker: PermissionChecker,
}

impl AuthGuard {
    pub fn new(validator: Arc<TokenValidator>, checker: PermissionChecker) -> Self {
        Self { validator, checker }
    }

    pub fn validator(&self) -> &Arc<TokenValidator> {
        &self.validator
    }

    /// Authorize a raw `Authorization` header value for `required`
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
        required: RequiredPermission,
    ) -> Result<DecodedClaims, AuthFailure> {
        let result = match TokenExtractor::extract(authorization) {
            Ok(token) => self.check_token(token, required).await,
            Err(failure) => Err(failure),
        };
        self.observe(&result, required);
        result
    }

    /// Authorize using the request's headers
    pub async fn authorize_headers(
        &self,
        headers: &HeaderMap,
        required: RequiredPermission,
    ) -> Result<DecodedClaims, AuthFailure> {
        let result = match TokenExtractor::from_headers(headers) {
            Ok(token) => self.check_token(token, required).await,
            Err(failure) => Err(failure),
        };
        self.observe(&result, required);
        result
    }

    /// Run `operation` with the decoded claims if the request is authorized
    ///
    /// The operation is never called when authorization fails.
    pub async fn protect<F, Fut, T>(
        &self,
        headers: &HeaderMap,
        required: RequiredPermission,
        operation: F,
    ) -> Result<T, AuthFailure>
    where
        F: FnOnce(DecodedClaims) -> Fut,
        Fut: Future<Output = T>,
    {
        let claims = self.authorize_headers(headers, required).await?;
        Ok(operation(claims).await)
    }

    /// Validate an already extracted bearer token and check `required`
    async fn check_token(
        &self,
        token: &str,
        required: RequiredPermission,
    ) -> Result<DecodedClaims, AuthFailure> {
        let claims = self.validator.validate(token).await?;
        self.checker.check(
            &claims,
            &self.validator.config().permissions_claim,
            required,
        )?;
        Ok(claims)
    }

    fn observe(&self, result: &Result<DecodedClaims, AuthFailure>, required: RequiredPermission) {
        match result {
            Ok(claims) => {
                debug!(
                    permission = %required,
                    subject = ?claims.subject,
                    "Request authorized"
                );
                crate::metrics::record_auth_decision(required.as_str(), "authorized");
            }
            Err(failure) => {
                warn!(
                    permission = %required,
                    kind = %failure.kind,
                    status = failure.status(),
                    "Request rejected"
                );
                crate::metrics::record_auth_decision(required.as_str(), failure.kind.code());
            }
        }
    }
}
