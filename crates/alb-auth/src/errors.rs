//! Error types for the ALB authenticator.
//!
//! Each pipeline stage has its own error type; they are folded into
//! [`AuthError`], which travels inside `AuthResult::CredentialsInvalid`.
//! Nothing here is ever returned as an `Err` from `authenticate`.
//!
//! [`AuthRejection`] is the HTTP-facing form used by the middleware. Client
//! messages are intentionally generic; the diagnostic stays server-side.

use crate::auth::claims::InvalidDateClaim;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::jwt::TokenParseError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure to obtain key material from the public key endpoint.
///
/// Never cached: the next request for the same `kid` retries the fetch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyFetchError {
    /// The key URL could not be built from the configured base URL.
    #[error("Invalid public key endpoint `{0}`")]
    InvalidEndpoint(String),

    /// The `kid` is a dot segment and cannot address a key under the base URL.
    #[error("Key id `{0}` cannot be used in a key URL")]
    InvalidKid(String),

    /// The endpoint answered with a non-2xx status.
    #[error("{}: `GET {url}` resulted in a `{status}` response", status_class(.status))]
    Status { url: String, status: StatusCode },

    /// The request did not complete within the configured timeouts.
    #[error("Request `GET {url}` timed out")]
    Timeout { url: String },

    /// Connection or protocol failure.
    #[error("Request `GET {url}` failed: {message}")]
    Transport { url: String, message: String },

    /// The response body could not be read.
    #[error("Failed to read response body of `GET {url}`: {message}")]
    Body { url: String, message: String },
}

fn status_class(status: &StatusCode) -> &'static str {
    if status.is_client_error() {
        "Client error"
    } else if status.is_server_error() {
        "Server error"
    } else {
        "Unexpected response"
    }
}

/// A mandatory token constraint that did not hold.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// Header `alg` is not the expected signing algorithm.
    #[error("Token signer mismatch")]
    SignerMismatch,

    /// Signature does not verify under the resolved key.
    #[error("Token signature mismatch")]
    SignatureMismatch,

    /// `iat` lies in the future (beyond leeway).
    #[error("The token was issued in the future")]
    IssuedInFuture,

    /// `nbf` lies in the future (beyond leeway).
    #[error("The token cannot be used yet")]
    NotYetValid,

    /// `exp` has passed (beyond leeway).
    #[error("The token is expired")]
    Expired,
}

/// Why a token was rejected as invalid credentials.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The token is not a well-formed compact JWS.
    #[error(transparent)]
    Malformed(#[from] TokenParseError),

    /// A temporal claim is present but not a timestamp.
    #[error(transparent)]
    InvalidDate(#[from] InvalidDateClaim),

    /// The signing key could not be fetched.
    #[error(transparent)]
    KeyFetch(#[from] KeyFetchError),

    /// The fetched key material is not a usable EC public key.
    #[error("The public key could not be used to verify the token: {0}")]
    InvalidKey(String),

    /// One or more mandatory constraints failed.
    #[error("The token violates some mandatory constraints, details:\n{}", ViolationList(.0))]
    ConstraintsViolated(Vec<ConstraintViolation>),
}

struct ViolationList<'a>(&'a [ConstraintViolation]);

impl fmt::Display for ViolationList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "- {violation}")?;
        }
        Ok(())
    }
}

/// HTTP rejection produced by the authentication middleware.
///
/// Maps to 401 Unauthorized for every variant.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    #[error("Credentials missing")]
    CredentialsMissing,

    #[error("Credentials invalid")]
    CredentialsInvalid,

    #[error("Identity not found")]
    IdentityNotFound,
}

impl AuthRejection {
    /// Returns the HTTP status code for this rejection.
    pub fn status_code(&self) -> u16 {
        StatusCode::UNAUTHORIZED.as_u16()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: &'static str,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            AuthRejection::CredentialsMissing => (
                "CREDENTIALS_MISSING",
                "Authentication is required to access this resource",
            ),
            AuthRejection::CredentialsInvalid => (
                "CREDENTIALS_INVALID",
                "The identity token is invalid or expired",
            ),
            AuthRejection::IdentityNotFound => (
                "IDENTITY_NOT_FOUND",
                "No account matches the authenticated identity",
            ),
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail { code, message },
        });

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message_names_http_failure() {
        let err = KeyFetchError::Status {
            url: "https://public-keys.auth.elb.eu-south-1.amazonaws.com/abc".to_string(),
            status: StatusCode::NOT_FOUND,
        };

        assert_eq!(
            err.to_string(),
            "Client error: `GET https://public-keys.auth.elb.eu-south-1.amazonaws.com/abc` resulted in a `404 Not Found` response"
        );
    }

    #[test]
    fn test_status_error_server_and_unexpected_classes() {
        let server = KeyFetchError::Status {
            url: "http://keys/abc".to_string(),
            status: StatusCode::BAD_GATEWAY,
        };
        assert!(server.to_string().starts_with("Server error:"));

        let redirect = KeyFetchError::Status {
            url: "http://keys/abc".to_string(),
            status: StatusCode::FOUND,
        };
        assert!(redirect.to_string().starts_with("Unexpected response:"));
    }

    #[test]
    fn test_single_violation_message() {
        let err = AuthError::ConstraintsViolated(vec![ConstraintViolation::Expired]);
        assert_eq!(
            err.to_string(),
            "The token violates some mandatory constraints, details:\n- The token is expired"
        );
    }

    #[test]
    fn test_multiple_violations_are_one_per_line() {
        let err = AuthError::ConstraintsViolated(vec![
            ConstraintViolation::SignatureMismatch,
            ConstraintViolation::NotYetValid,
        ]);
        assert_eq!(
            err.to_string(),
            "The token violates some mandatory constraints, details:\n\
             - Token signature mismatch\n\
             - The token cannot be used yet"
        );
    }

    #[test]
    fn test_malformed_is_transparent() {
        let err = AuthError::from(TokenParseError::WrongSegmentCount);
        assert_eq!(err.to_string(), "The JWT string must have two dots");
    }

    #[test]
    fn test_rejection_status_is_unauthorized() {
        for rejection in [
            AuthRejection::CredentialsMissing,
            AuthRejection::CredentialsInvalid,
            AuthRejection::IdentityNotFound,
        ] {
            assert_eq!(rejection.status_code(), 401);
            assert_eq!(
                rejection.into_response().status(),
                StatusCode::UNAUTHORIZED
            );
        }
    }
}
