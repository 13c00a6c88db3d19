//! Metrics definitions for the ALB authenticator.
//!
//! All metrics follow Prometheus naming conventions:
//! - `alb_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: fixed per metric (success, error, timeout / hit, miss)
//! - `outcome`: the four authentication result statuses
//!
//! Key IDs and subjects are never used as labels.

use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Key Resolver Metrics
// ============================================================================

/// Record a public key fetch against the key endpoint.
///
/// Metric: `alb_auth_key_fetch_duration_seconds`, `alb_auth_key_fetches_total`
/// Labels: `status` ("success", "error", "timeout")
pub fn record_key_fetch(status: &str, duration: Duration) {
    histogram!("alb_auth_key_fetch_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("alb_auth_key_fetches_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a key cache lookup.
///
/// Metric: `alb_auth_key_cache_total`
/// Labels: `status` ("hit", "miss")
pub fn record_key_cache(status: &str) {
    counter!("alb_auth_key_cache_total",
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record a completed authentication attempt.
///
/// Metric: `alb_auth_authentications_total`, `alb_auth_authentication_duration_seconds`
/// Labels: `outcome` (`SUCCESS`, `FAILURE_CREDENTIALS_MISSING`,
/// `FAILURE_CREDENTIALS_INVALID`, `FAILURE_IDENTITY_NOT_FOUND`)
pub fn record_authentication(outcome: &str, duration: Duration) {
    histogram!("alb_auth_authentication_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("alb_auth_authentications_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
