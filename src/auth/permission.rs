//! Permission checks against the validated token's permission claim

use super::jwt::DecodedClaims;
use super::{AuthFailure, AuthFailureKind, RequiredPermission};
use serde::{Deserialize, Serialize};

/// How to treat a token whose payload has no permission claim at all
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingPermissionsPolicy {
    /// Client error: the token was issued without RBAC claims (400)
    #[default]
    Reject,
    /// Treat the absent claim as an empty grant (403)
    Deny,
}

/// Checks that a required permission was granted
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionChecker {
    policy: MissingPermissionsPolicy,
}

impl PermissionChecker {
    pub fn new(policy: MissingPermissionsPolicy) -> Self {
        Self { policy }
    }

    /// Succeeds only if `required` is in the claim, by exact string match
    pub fn check(
        &self,
        claims: &DecodedClaims,
        claim_name: &str,
        required: RequiredPermission,
    ) -> Result<(), AuthFailure> {
        if !claims.has_claim(claim_name) && self.policy == MissingPermissionsPolicy::Reject {
            return Err(AuthFailure::new(
                AuthFailureKind::PermissionsClaimMissing,
                "Permissions not included in JWT.",
            ));
        }

        if !claims.has_permission(required.as_str()) {
            return Err(AuthFailure::new(
                AuthFailureKind::PermissionDenied,
                "Permission not found.",
            ));
        }

        Ok(())
    }
}
