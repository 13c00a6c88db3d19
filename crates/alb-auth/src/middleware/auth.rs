//! Authentication middleware for protected routes.
//!
//! Runs the ALB authenticator on the incoming headers and injects the
//! principal (and the verified claims) into request extensions.

use crate::auth::{AlbAuthenticator, AuthResult, Claims, Principal};
use crate::errors::AuthRejection;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<AlbAuthenticator>,
}

/// Authentication middleware for the ALB identity header.
///
/// # Response
///
/// - 401 Unauthorized with a JSON error body if authentication fails
/// - Continues to next handler with [`Principal`] in extensions otherwise
#[instrument(skip(state, req, next), name = "alb.middleware.auth")]
pub async fn require_alb_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let authentication = state.authenticator.authenticate_detailed(req.headers()).await;

    let principal = match authentication.result {
        AuthResult::Success(principal) => principal,
        AuthResult::CredentialsMissing => {
            tracing::debug!(target: "alb.middleware.auth", "Credentials missing");
            return Err(AuthRejection::CredentialsMissing);
        }
        AuthResult::CredentialsInvalid(error) => {
            // Diagnostic stays server-side
            tracing::debug!(
                target: "alb.middleware.auth",
                error = error.as_ref().map(tracing::field::display),
                "Credentials invalid"
            );
            return Err(AuthRejection::CredentialsInvalid);
        }
        AuthResult::IdentityNotFound(errors) => {
            tracing::debug!(target: "alb.middleware.auth", ?errors, "Identity not found");
            return Err(AuthRejection::IdentityNotFound);
        }
    };

    if let Some(claims) = authentication.payload {
        req.extensions_mut().insert(claims);
    }
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Extension trait for reading the authenticated principal from a request.
pub trait PrincipalExt {
    /// Returns `None` if the auth middleware was not applied to this request.
    fn principal(&self) -> Option<&Principal>;

    /// Verified token claims, regardless of principal kind.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> PrincipalExt for axum::extract::Request<B> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }

    fn claims(&self) -> Option<&Claims> {
        self.extensions().get::<Claims>()
    }
}
