//! Shared helpers for integration tests
//!
//! Keys are real PEM fixtures under `tests/fixtures/`; the matching JWK
//! components are stored next to them.

#![allow(dead_code)]

use casting_agency::auth::jwks::KeySetResolver;
use casting_agency::auth::{
    AuthGuard, MissingPermissionsPolicy, PermissionChecker, TokenValidator, ValidatorConfig,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const ISSUER: &str = "https://casting.example.auth0.com/";
pub const AUDIENCE: &str = "casting-agency";

pub const PRIMARY_KEY: &str = include_str!("../fixtures/rsa_primary.pem");
pub const ROTATED_KEY: &str = include_str!("../fixtures/rsa_rotated.pem");
pub const ATTACKER_KEY: &str = include_str!("../fixtures/rsa_attacker.pem");
pub const PRIMARY_PUBLIC_PEM: &str = include_str!("../fixtures/rsa_primary_pub.pem");
pub const EC_KEY: &str = include_str!("../fixtures/ec_primary.pem");

const PRIMARY_N: &str = include_str!("../fixtures/rsa_primary.n");
const ROTATED_N: &str = include_str!("../fixtures/rsa_rotated.n");
const EC_X: &str = include_str!("../fixtures/ec_primary.x");
const EC_Y: &str = include_str!("../fixtures/ec_primary.y");

pub const ALL_PERMISSIONS: &[&str] = &[
    "get:actors",
    "post:actors",
    "patch:actors",
    "delete:actors",
    "get:movies",
    "post:movies",
    "patch:movies",
    "delete:movies",
];

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// JWK for the primary RSA key
pub fn primary_jwk(kid: &str) -> Value {
    rsa_jwk(kid, PRIMARY_N)
}

/// JWK for the key the provider rotates to
pub fn rotated_jwk(kid: &str) -> Value {
    rsa_jwk(kid, ROTATED_N)
}

fn rsa_jwk(kid: &str, n: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": n.trim(),
        "e": "AQAB",
    })
}

pub fn ec_jwk(kid: &str) -> Value {
    json!({
        "kty": "EC",
        "kid": kid,
        "use": "sig",
        "alg": "ES256",
        "crv": "P-256",
        "x": EC_X.trim(),
        "y": EC_Y.trim(),
    })
}

pub fn jwks(keys: Vec<Value>) -> Value {
    json!({ "keys": keys })
}

/// Standard claims valid for an hour
pub fn claims(permissions: Option<&[&str]>) -> Value {
    let mut claims = json!({
        "iss": ISSUER,
        "aud": [AUDIENCE, "https://casting.example.auth0.com/userinfo"],
        "sub": "auth0|casting-director",
        "iat": now(),
        "exp": now() + 3600,
    });
    if let Some(permissions) = permissions {
        claims["permissions"] = json!(permissions);
    }
    claims
}

pub fn sign_rs256(pem: &str, kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn sign_es256(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_ec_pem(EC_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

/// Token signed with HS256, using the provider's public key as the secret
pub fn sign_hs256_with_public_key(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_secret(PRIMARY_PUBLIC_PEM.as_bytes()),
    )
    .unwrap()
}

pub fn validator_config() -> ValidatorConfig {
    ValidatorConfig::new(ISSUER, AUDIENCE, Algorithm::RS256)
}

pub fn guard_for(resolver: Arc<KeySetResolver>, policy: MissingPermissionsPolicy) -> AuthGuard {
    let validator = TokenValidator::new(validator_config(), resolver);
    AuthGuard::new(Arc::new(validator), PermissionChecker::new(policy))
}

/// Guard over fixed keys (no network)
pub fn static_guard(keys: Value) -> AuthGuard {
    let resolver = KeySetResolver::from_jwks(serde_json::from_value(keys).unwrap());
    guard_for(Arc::new(resolver), MissingPermissionsPolicy::Reject)
}

/// Resolver fetching from `{base}/.well-known/jwks.json`
pub fn remote_resolver(base: &str) -> Arc<KeySetResolver> {
    Arc::new(
        KeySetResolver::remote(
            &format!("{}/.well-known/jwks.json", base),
            Duration::from_millis(500),
        )
        .unwrap(),
    )
}
