//! HTTP routes for the `alb-whoami` reference service.

use crate::auth::{AlbAuthenticator, Claims, Principal};
use crate::middleware::{require_alb_auth, AuthState};
use axum::{middleware, routing::get, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Response body of `/whoami`.
#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub principal: Principal,

    /// Subject of the verified token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - liveness probe, unauthenticated
/// - `/whoami` - echoes the authenticated principal
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(authenticator: Arc<AlbAuthenticator>) -> Router {
    let auth_state = Arc::new(AuthState { authenticator });

    let protected_routes = Router::new()
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn_with_state(auth_state, require_alb_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

async fn health() -> &'static str {
    "OK"
}

async fn whoami(
    Extension(principal): Extension<Principal>,
    claims: Option<Extension<Claims>>,
) -> Json<WhoAmIResponse> {
    let subject = claims.and_then(|Extension(claims)| claims.subject().map(str::to_string));
    Json(WhoAmIResponse { principal, subject })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whoami_response_omits_missing_subject() {
        let response = WhoAmIResponse {
            principal: Principal::Identity(serde_json::json!({"id": 9})),
            subject: None,
        };
        let value = serde_json::to_value(&response).unwrap_or_default();
        assert_eq!(value, serde_json::json!({"principal": {"id": 9}}));
    }
}
