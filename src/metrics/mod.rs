//! Metrics module
//!
//! Prometheus metrics for authorization decisions, key set fetches and
//! HTTP traffic.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

lazy_static! {
    // Auth metrics
    pub static ref AUTH_DECISIONS: CounterVec = register_counter_vec!(
        "casting_auth_decisions_total",
        "Authorization decisions by required permission and outcome",
        &["permission", "outcome"]
    ).unwrap();

    pub static ref JWKS_FETCHES: CounterVec = register_counter_vec!(
        "casting_jwks_fetches_total",
        "Signing key set fetches",
        &["status"]
    ).unwrap();

    // HTTP metrics
    pub static ref HTTP_REQUESTS: CounterVec = register_counter_vec!(
        "casting_http_requests_total",
        "HTTP requests by route and response status",
        &["route", "status"]
    ).unwrap();

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "casting_http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["route"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();
}

/// Record an authorization decision
///
/// `outcome` is `authorized` or the failure kind's code.
pub fn record_auth_decision(permission: &str, outcome: &str) {
    AUTH_DECISIONS
        .with_label_values(&[permission, outcome])
        .inc();
}

/// Record a completed key set fetch
pub fn record_jwks_fetch(success: bool) {
    let status = if success { "success" } else { "failure" };
    JWKS_FETCHES.with_label_values(&[status]).inc();
}

/// Record a handled HTTP request
pub fn record_http_request(route: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    HTTP_REQUESTS
        .with_label_values(&[route, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[route])
        .observe(duration_secs);
}
