//! Auth Guard Integration Tests
//!
//! End-to-end authorization decisions: header extraction, algorithm
//! allowlist, signature, standard claims and permission checks.

mod common;

use casting_agency::auth::{AuthFailureKind, MissingPermissionsPolicy, RequiredPermission};
use common::*;
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

fn headers_with(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&bearer(token)).unwrap());
    headers
}

#[tokio::test]
async fn test_valid_token_invokes_operation_with_claims() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));
    let token = sign_rs256(PRIMARY_KEY, "key-1", &claims(Some(&["get:actors"])));

    let subject = guard
        .protect(
            &headers_with(&token),
            RequiredPermission::GET_ACTORS,
            |claims| async move {
                assert!(claims.has_permission("get:actors"));
                claims.subject
            },
        )
        .await
        .unwrap();

    assert_eq!(subject.as_deref(), Some("auth0|casting-director"));
}

#[tokio::test]
async fn test_missing_header_is_401() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));
    let calls = AtomicUsize::new(0);

    let failure = guard
        .protect(&HeaderMap::new(), RequiredPermission::GET_MOVIES, |_| async {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap_err();

    assert_eq!(failure.kind, AuthFailureKind::MissingHeader);
    assert_eq!(failure.status(), 401);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_permission_is_403() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));
    let token = sign_rs256(PRIMARY_KEY, "key-1", &claims(Some(&["get:actors"])));

    let failure = guard
        .authorize(Some(&bearer(&token)), RequiredPermission::POST_ACTORS)
        .await
        .unwrap_err();

    assert_eq!(failure.kind, AuthFailureKind::PermissionDenied);
    assert_eq!(failure.status(), 403);
}

#[tokio::test]
async fn test_missing_permissions_claim_policy() {
    let token = sign_rs256(PRIMARY_KEY, "key-1", &claims(None));

    let reject = static_guard(jwks(vec![primary_jwk("key-1")]));
    let failure = reject
        .authorize(Some(&bearer(&token)), RequiredPermission::GET_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::PermissionsClaimMissing);
    assert_eq!(failure.status(), 400);

    let resolver = casting_agency::auth::KeySetResolver::from_jwks(
        serde_json::from_value(jwks(vec![primary_jwk("key-1")])).unwrap(),
    );
    let deny = guard_for(Arc::new(resolver), MissingPermissionsPolicy::Deny);
    let failure = deny
        .authorize(Some(&bearer(&token)), RequiredPermission::GET_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::PermissionDenied);
    assert_eq!(failure.status(), 403);
}

#[tokio::test]
async fn test_expired_token_regardless_of_permissions() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));

    for permissions in [Some(ALL_PERMISSIONS), Some(&[][..]), None] {
        let mut expired = claims(permissions);
        expired["exp"] = json!(now() - 60);
        let token = sign_rs256(PRIMARY_KEY, "key-1", &expired);

        let failure = guard
            .authorize(Some(&bearer(&token)), RequiredPermission::GET_ACTORS)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, AuthFailureKind::TokenExpired);
    }
}

#[tokio::test]
async fn test_not_yet_valid_token() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));
    let mut early = claims(Some(ALL_PERMISSIONS));
    early["nbf"] = json!(now() + 600);
    let token = sign_rs256(PRIMARY_KEY, "key-1", &early);

    let failure = guard
        .authorize(Some(&bearer(&token)), RequiredPermission::GET_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::TokenNotYetValid);
}

#[tokio::test]
async fn test_issuer_and_audience_mismatch() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));

    let mut other_issuer = claims(Some(ALL_PERMISSIONS));
    // Trailing slash matters
    other_issuer["iss"] = json!("https://casting.example.auth0.com");
    let token = sign_rs256(PRIMARY_KEY, "key-1", &other_issuer);
    let failure = guard
        .authorize(Some(&bearer(&token)), RequiredPermission::GET_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::IssuerMismatch);

    let mut other_audience = claims(Some(ALL_PERMISSIONS));
    other_audience["aud"] = json!("billing-api");
    let token = sign_rs256(PRIMARY_KEY, "key-1", &other_audience);
    let failure = guard
        .authorize(Some(&bearer(&token)), RequiredPermission::GET_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::AudienceMismatch);
}

#[tokio::test]
async fn test_forged_signature_rejected() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));
    let token = sign_rs256(ATTACKER_KEY, "key-1", &claims(Some(ALL_PERMISSIONS)));

    let failure = guard
        .authorize(Some(&bearer(&token)), RequiredPermission::DELETE_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::InvalidSignature);
    assert_eq!(failure.status(), 401);
}

#[tokio::test]
async fn test_tampered_payload_rejected() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));
    let token = sign_rs256(PRIMARY_KEY, "key-1", &claims(Some(&["get:actors"])));

    // Swap in a payload granting everything, keep the original signature
    let forged_payload = {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;
        URL_SAFE_NO_PAD.encode(claims(Some(ALL_PERMISSIONS)).to_string())
    };
    let parts: Vec<&str> = token.split('.').collect();
    let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

    let failure = guard
        .authorize(Some(&bearer(&tampered)), RequiredPermission::DELETE_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::InvalidSignature);
}

#[tokio::test]
async fn test_algorithm_substitution_rejected_before_key_lookup() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(vec![primary_jwk("key-1")])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let resolver = remote_resolver(&mock_server.uri());
    let guard = guard_for(Arc::clone(&resolver), MissingPermissionsPolicy::Reject);

    let hs256 = sign_hs256_with_public_key("key-1", &claims(Some(ALL_PERMISSIONS)));
    let es256 = sign_es256("key-1", &claims(Some(ALL_PERMISSIONS)));
    let unsigned = {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"none","kid":"key-1"}"#),
            URL_SAFE_NO_PAD.encode(claims(Some(ALL_PERMISSIONS)).to_string())
        )
    };
    let unsigned_with_sig = format!("{}c2ln", unsigned);

    for token in [&hs256, &es256, &unsigned_with_sig] {
        let failure = guard
            .authorize(Some(&bearer(token)), RequiredPermission::DELETE_MOVIES)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, AuthFailureKind::UnsupportedAlgorithm);
        assert_eq!(failure.status(), 401);
    }

    // Empty signature segment never parses as a token
    let failure = guard
        .authorize(Some(&bearer(&unsigned)), RequiredPermission::DELETE_MOVIES)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::MalformedToken);

    assert_eq!(resolver.fetch_count(), 0);
}

#[tokio::test]
async fn test_unknown_kid_rejected_after_one_refresh() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks(vec![primary_jwk("key-1")])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let resolver = remote_resolver(&mock_server.uri());
    let guard = guard_for(Arc::clone(&resolver), MissingPermissionsPolicy::Reject);

    let good = sign_rs256(PRIMARY_KEY, "key-1", &claims(Some(ALL_PERMISSIONS)));
    guard
        .authorize(Some(&bearer(&good)), RequiredPermission::GET_ACTORS)
        .await
        .unwrap();

    let unknown = sign_rs256(ROTATED_KEY, "key-9", &claims(Some(ALL_PERMISSIONS)));
    let failure = guard
        .authorize(Some(&bearer(&unknown)), RequiredPermission::GET_ACTORS)
        .await
        .unwrap_err();
    assert_eq!(failure.kind, AuthFailureKind::UnknownSigningKey);
    assert_eq!(resolver.fetch_count(), 2);
}

#[tokio::test]
async fn test_repeated_authorization_is_stable() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));
    let token = sign_rs256(PRIMARY_KEY, "key-1", &claims(Some(&["get:movies"])));

    for _ in 0..3 {
        assert!(guard
            .authorize(Some(&bearer(&token)), RequiredPermission::GET_MOVIES)
            .await
            .is_ok());
        assert_eq!(
            guard
                .authorize(Some(&bearer(&token)), RequiredPermission::PATCH_MOVIES)
                .await
                .unwrap_err()
                .kind,
            AuthFailureKind::PermissionDenied
        );
    }
}

#[tokio::test]
async fn test_malformed_headers() {
    let guard = static_guard(jwks(vec![primary_jwk("key-1")]));

    let cases = [
        ("Bearer", AuthFailureKind::MalformedHeader),
        ("Bearer a b", AuthFailureKind::MalformedHeader),
        ("bearer abc", AuthFailureKind::UnsupportedScheme),
        ("Basic dXNlcjpwYXNz", AuthFailureKind::UnsupportedScheme),
        ("Bearer not.a.jwt", AuthFailureKind::MalformedToken),
    ];
    for (header, expected) in cases {
        let failure = guard
            .authorize(Some(header), RequiredPermission::GET_ACTORS)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, expected, "{}", header);
        assert_eq!(failure.status(), 401);
    }
}
