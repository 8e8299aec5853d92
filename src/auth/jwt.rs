//! JWT validation
//!
//! Verifies compact-serialized JWS tokens against keys from the
//! [`KeySetResolver`] and checks the standard claims.
//!
//! Order of checks:
//!
//! 1. header `alg` must be the deployment's allowlisted algorithm
//!    (before any key lookup, so `none`/`HS256` substitution never reaches
//!    signature verification)
//! 2. header `kid` resolves to a provider key
//! 3. signature
//! 4. `exp`, `nbf`, `iss`, `aud`
//!
//! Claim values are only read after step 3.

use super::jwks::KeySetResolver;
use super::{AuthFailure, AuthFailureKind};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Default name of the claim carrying granted permissions (Auth0 RBAC)
pub const DEFAULT_PERMISSIONS_CLAIM: &str = "permissions";

/// Token validation settings for one deployment
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Expected `iss`, compared exactly
    pub issuer: String,
    /// Audience that must appear in `aud`
    pub audience: String,
    /// The single accepted signing algorithm
    pub algorithm: Algorithm,
    /// Clock skew tolerance for `exp` and `nbf`
    pub leeway_seconds: u64,
    /// Claim holding the permission list
    pub permissions_claim: String,
}

impl ValidatorConfig {
    pub fn new(issuer: &str, audience: &str, algorithm: Algorithm) -> Self {
        Self {
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            algorithm,
            leeway_seconds: 0,
            permissions_claim: DEFAULT_PERMISSIONS_CLAIM.to_string(),
        }
    }

    #[must_use]
    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway_seconds = leeway_seconds;
        self
    }

    #[must_use]
    pub fn with_permissions_claim(mut self, claim: &str) -> Self {
        self.permissions_claim = claim.to_string();
        self
    }
}

/// Claims of a token whose signature has been verified
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClaims {
    pub issuer: String,
    pub audience: Vec<String>,
    pub subject: Option<String>,
    pub expires_at: i64,
    pub not_before: Option<i64>,
    /// Granted permissions; empty when the claim is absent
    pub permissions: BTreeSet<String>,
    /// Whole payload, including claims not modelled above
    pub raw: Map<String, Value>,
}

impl DecodedClaims {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Whether the payload carries `name` at all
    pub fn has_claim(&self, name: &str) -> bool {
        self.raw.contains_key(name)
    }
}

/// The header fields read before the signature is checked
#[derive(Debug, Deserialize)]
struct UnverifiedHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// JWT validator backed by a JWKS resolver
pub struct TokenValidator {
    config: ValidatorConfig,
    resolver: Arc<KeySetResolver>,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(config: ValidatorConfig, resolver: Arc<KeySetResolver>) -> Self {
        // Signature only; claims are checked by hand so each failure gets
        // its own kind.
        let mut validation = Validation::new(config.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            config,
            resolver,
            validation,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<KeySetResolver> {
        &self.resolver
    }

    /// Validate a raw token and return its claims
    pub async fn validate(&self, token: &str) -> Result<DecodedClaims, AuthFailure> {
        let header = read_header(token)?;

        let declared = header.alg.parse::<Algorithm>().ok();
        if declared != Some(self.config.algorithm) {
            return Err(AuthFailure::new(
                AuthFailureKind::UnsupportedAlgorithm,
                format!(
                    "Unsupported token algorithm; expected {:?}.",
                    self.config.algorithm
                ),
            ));
        }

        let kid = header.kid.filter(|kid| !kid.is_empty()).ok_or_else(|| {
            AuthFailure::new(
                AuthFailureKind::MalformedToken,
                "Authorization malformed: token header has no key id.",
            )
        })?;

        let signing_key = self.resolver.resolve(&kid).await?;

        if let Some(pinned) = signing_key.algorithm {
            if pinned != self.config.algorithm {
                return Err(invalid_signature());
            }
        }

        let payload = decode::<Map<String, Value>>(token, &signing_key.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) | ErrorKind::InvalidToken => {
                    malformed_token()
                }
                _ => invalid_signature(),
            })?
            .claims;

        let claims = self.check_claims(payload, chrono::Utc::now().timestamp())?;
        debug!(subject = ?claims.subject, kid = %kid, "Token validated");
        Ok(claims)
    }

    /// Check standard claims of a verified payload at time `now`
    fn check_claims(
        &self,
        payload: Map<String, Value>,
        now: i64,
    ) -> Result<DecodedClaims, AuthFailure> {
        let leeway = i64::try_from(self.config.leeway_seconds).unwrap_or(i64::MAX);

        let expires_at = match payload.get("exp") {
            Some(value) => numeric_date(value).ok_or_else(malformed_token)?,
            None => {
                return Err(AuthFailure::new(
                    AuthFailureKind::MalformedToken,
                    "Token has no expiry.",
                ))
            }
        };
        if expires_at <= now.saturating_sub(leeway) {
            return Err(AuthFailure::new(
                AuthFailureKind::TokenExpired,
                "Token expired.",
            ));
        }

        let not_before = match payload.get("nbf") {
            Some(value) => Some(numeric_date(value).ok_or_else(malformed_token)?),
            None => None,
        };
        if let Some(nbf) = not_before {
            if nbf > now.saturating_add(leeway) {
                return Err(AuthFailure::new(
                    AuthFailureKind::TokenNotYetValid,
                    "Token is not valid yet.",
                ));
            }
        }

        let issuer = match payload.get("iss").and_then(Value::as_str) {
            Some(iss) if iss == self.config.issuer => iss.to_string(),
            _ => {
                return Err(AuthFailure::new(
                    AuthFailureKind::IssuerMismatch,
                    "Incorrect claims. Please, check the issuer.",
                ))
            }
        };

        let audience = audiences(payload.get("aud"));
        if !audience.iter().any(|aud| *aud == self.config.audience) {
            return Err(AuthFailure::new(
                AuthFailureKind::AudienceMismatch,
                "Incorrect claims. Please, check the audience.",
            ));
        }

        let permissions: BTreeSet<String> = match payload.get(&self.config.permissions_claim) {
            None => BTreeSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(malformed_token))
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(AuthFailure::new(
                    AuthFailureKind::MalformedToken,
                    "Permissions claim must be a list of strings.",
                ))
            }
        };

        let subject = payload.get("sub").and_then(Value::as_str).map(str::to_string);

        Ok(DecodedClaims {
            issuer,
            audience,
            subject,
            expires_at,
            not_before,
            permissions,
            raw: payload,
        })
    }
}

/// Decode the header segment without verifying anything
fn read_header(token: &str) -> Result<UnverifiedHeader, AuthFailure> {
    let mut segments = token.split('.');
    let (header, payload, signature) = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(malformed_token()),
    };
    if header.is_empty() || payload.is_empty() || signature.is_empty() {
        return Err(malformed_token());
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| malformed_token())?;
    serde_json::from_slice(&bytes).map_err(|_| malformed_token())
}

/// `aud` may be a single string or a list of strings
fn audiences(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn numeric_date(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn malformed_token() -> AuthFailure {
    AuthFailure::new(
        AuthFailureKind::MalformedToken,
        "Unable to parse authentication token.",
    )
}

fn invalid_signature() -> AuthFailure {
    AuthFailure::new(
        AuthFailureKind::InvalidSignature,
        "Token signature is invalid.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwks::Jwks;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const PRIMARY_KEY: &str = include_str!("../../tests/fixtures/rsa_primary.pem");
    const PRIMARY_N: &str = include_str!("../../tests/fixtures/rsa_primary.n");

    const ISSUER: &str = "https://casting.example.auth0.com/";
    const AUDIENCE: &str = "casting-agency";

    fn validator() -> TokenValidator {
        let jwks: Jwks = serde_json::from_value(json!({
            "keys": [{
                "kty": "RSA", "kid": "primary", "use": "sig", "alg": "RS256",
                "n": PRIMARY_N.trim(), "e": "AQAB"
            }]
        }))
        .unwrap();
        TokenValidator::new(
            ValidatorConfig::new(ISSUER, AUDIENCE, Algorithm::RS256),
            Arc::new(KeySetResolver::from_jwks(jwks)),
        )
    }

    fn sign(claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("primary".to_string());
        encode(
            &header,
            claims,
            &EncodingKey::from_rsa_pem(PRIMARY_KEY.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = sign(&json!({
            "iss": ISSUER, "aud": [AUDIENCE, "other"], "sub": "auth0|123",
            "exp": exp, "permissions": ["get:actors", "get:movies"]
        }));

        let claims = validator().validate(&token).await.unwrap();
        assert_eq!(claims.issuer, ISSUER);
        assert_eq!(claims.subject.as_deref(), Some("auth0|123"));
        assert_eq!(claims.expires_at, exp);
        assert!(claims.has_permission("get:movies"));
        assert!(!claims.has_permission("post:movies"));
        assert!(claims.has_claim("permissions"));
    }

    #[tokio::test]
    async fn test_not_three_segments_is_malformed() {
        for token in ["abc", "a.b", "a.b.c.d", "..sig", "%%%.b.c"] {
            let failure = validator().validate(token).await.unwrap_err();
            assert_eq!(failure.kind, AuthFailureKind::MalformedToken, "{}", token);
        }
    }

    #[tokio::test]
    async fn test_missing_kid_is_malformed() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let token = format!("{}.e30.c2ln", header);
        let failure = validator().validate(&token).await.unwrap_err();
        assert_eq!(failure.kind, AuthFailureKind::MalformedToken);
    }

    #[test]
    fn test_expiry_boundaries() {
        let v = validator();
        let base = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": 1000});

        assert_eq!(
            v.check_claims(payload(base.clone()), 1000).unwrap_err().kind,
            AuthFailureKind::TokenExpired
        );
        assert!(v.check_claims(payload(base), 999).is_ok());
    }

    #[test]
    fn test_leeway_applies_to_exp_and_nbf() {
        let mut v = validator();
        v.config.leeway_seconds = 30;

        let expired_recently = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": 990});
        assert!(v.check_claims(payload(expired_recently), 1000).is_ok());

        let early = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": 5000, "nbf": 1020});
        assert!(v.check_claims(payload(early), 1000).is_ok());
    }

    #[test]
    fn test_huge_leeway_does_not_overflow() {
        let mut v = validator();
        v.config.leeway_seconds = u64::MAX;

        let stale = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": 1});
        assert!(v.check_claims(payload(stale), i64::MIN + 10).is_ok());

        let early = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": i64::MAX, "nbf": i64::MAX});
        assert!(v.check_claims(payload(early), 1000).is_ok());
    }

    #[test]
    fn test_not_before() {
        let v = validator();
        let future = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": 5000, "nbf": 2000});
        assert_eq!(
            v.check_claims(payload(future), 1000).unwrap_err().kind,
            AuthFailureKind::TokenNotYetValid
        );
    }

    #[test]
    fn test_issuer_and_audience() {
        let v = validator();

        let wrong_iss = json!({"iss": "https://evil.example/", "aud": AUDIENCE, "exp": 5000});
        assert_eq!(
            v.check_claims(payload(wrong_iss), 1000).unwrap_err().kind,
            AuthFailureKind::IssuerMismatch
        );

        let no_iss = json!({"aud": AUDIENCE, "exp": 5000});
        assert_eq!(
            v.check_claims(payload(no_iss), 1000).unwrap_err().kind,
            AuthFailureKind::IssuerMismatch
        );

        let wrong_aud = json!({"iss": ISSUER, "aud": ["other-api"], "exp": 5000});
        assert_eq!(
            v.check_claims(payload(wrong_aud), 1000).unwrap_err().kind,
            AuthFailureKind::AudienceMismatch
        );
    }

    #[test]
    fn test_permissions_normalization() {
        let v = validator();

        let absent = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": 5000});
        let claims = v.check_claims(payload(absent), 1000).unwrap();
        assert!(claims.permissions.is_empty());
        assert!(!claims.has_claim("permissions"));

        let duplicated = json!({
            "iss": ISSUER, "aud": AUDIENCE, "exp": 5000,
            "permissions": ["get:actors", "get:actors"]
        });
        let claims = v.check_claims(payload(duplicated), 1000).unwrap();
        assert_eq!(claims.permissions.len(), 1);

        let not_a_list = json!({"iss": ISSUER, "aud": AUDIENCE, "exp": 5000, "permissions": "get:actors"});
        assert_eq!(
            v.check_claims(payload(not_a_list), 1000).unwrap_err().kind,
            AuthFailureKind::MalformedToken
        );
    }

    #[test]
    fn test_missing_exp_is_malformed() {
        let v = validator();
        let no_exp = json!({"iss": ISSUER, "aud": AUDIENCE});
        assert_eq!(
            v.check_claims(payload(no_exp), 1000).unwrap_err().kind,
            AuthFailureKind::MalformedToken
        );
    }
}
