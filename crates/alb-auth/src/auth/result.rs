//! Authentication outcome types.

use crate::auth::claims::Claims;
use crate::errors::AuthError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Errors reported by an identity resolver, passed through verbatim.
pub type ResolverErrors = Vec<String>;

/// Status code of an [`AuthResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthStatus {
    Success,
    CredentialsMissing,
    CredentialsInvalid,
    IdentityNotFound,
}

impl AuthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStatus::Success => "SUCCESS",
            AuthStatus::CredentialsMissing => "FAILURE_CREDENTIALS_MISSING",
            AuthStatus::CredentialsInvalid => "FAILURE_CREDENTIALS_INVALID",
            AuthStatus::IdentityNotFound => "FAILURE_IDENTITY_NOT_FOUND",
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Principal {
    /// Verified token claims, returned as-is.
    Claims(Claims),

    /// Identity returned by the identity resolver.
    Identity(Value),
}

/// Outcome of authenticating one request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    Success(Principal),

    /// No token was sent, or a verified token has no subject.
    CredentialsMissing,

    /// The token was rejected. `None` when the header has no usable `kid`.
    CredentialsInvalid(Option<AuthError>),

    IdentityNotFound(ResolverErrors),
}

impl AuthResult {
    pub fn status(&self) -> AuthStatus {
        match self {
            AuthResult::Success(_) => AuthStatus::Success,
            AuthResult::CredentialsMissing => AuthStatus::CredentialsMissing,
            AuthResult::CredentialsInvalid(_) => AuthStatus::CredentialsInvalid,
            AuthResult::IdentityNotFound(_) => AuthStatus::IdentityNotFound,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, AuthResult::Success(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            AuthResult::Success(principal) => Some(principal),
            _ => None,
        }
    }

    pub fn into_principal(self) -> Option<Principal> {
        match self {
            AuthResult::Success(principal) => Some(principal),
            _ => None,
        }
    }

    /// The diagnostic error attached to an invalid-credentials result.
    pub fn error(&self) -> Option<&AuthError> {
        match self {
            AuthResult::CredentialsInvalid(error) => error.as_ref(),
            _ => None,
        }
    }

    /// Diagnostic message, if the result carries one.
    pub fn message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }

    /// Resolver-reported errors; empty for every other outcome.
    pub fn errors(&self) -> &[String] {
        match self {
            AuthResult::IdentityNotFound(errors) => errors.as_slice(),
            _ => &[],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::ConstraintViolation;
    use serde_json::json;

    #[test]
    fn test_status_strings() {
        assert_eq!(AuthResult::CredentialsMissing.status().as_str(), "FAILURE_CREDENTIALS_MISSING");
        assert_eq!(
            AuthResult::CredentialsInvalid(None).status().to_string(),
            "FAILURE_CREDENTIALS_INVALID"
        );
        assert_eq!(
            AuthResult::IdentityNotFound(vec![]).status().as_str(),
            "FAILURE_IDENTITY_NOT_FOUND"
        );
        assert_eq!(
            AuthResult::Success(Principal::Identity(json!({}))).status().as_str(),
            "SUCCESS"
        );
    }

    #[test]
    fn test_only_success_is_valid() {
        assert!(AuthResult::Success(Principal::Identity(json!({"id": 1}))).is_valid());
        assert!(!AuthResult::CredentialsMissing.is_valid());
        assert!(!AuthResult::CredentialsInvalid(None).is_valid());
        assert!(!AuthResult::IdentityNotFound(vec!["nope".to_string()]).is_valid());
    }

    #[test]
    fn test_message_and_errors() {
        let invalid = AuthResult::CredentialsInvalid(Some(AuthError::ConstraintsViolated(vec![
            ConstraintViolation::Expired,
        ])));
        assert_eq!(
            invalid.message().as_deref(),
            Some("The token violates some mandatory constraints, details:\n- The token is expired")
        );
        assert!(invalid.errors().is_empty());

        assert_eq!(AuthResult::CredentialsInvalid(None).message(), None);
        assert_eq!(AuthResult::CredentialsMissing.message(), None);

        let not_found = AuthResult::IdentityNotFound(vec!["account disabled".to_string()]);
        assert_eq!(not_found.errors(), ["account disabled".to_string()]);
        assert_eq!(not_found.message(), None);
    }

    #[test]
    fn test_identity_principal_serializes_untagged() {
        let principal = Principal::Identity(json!({"id": 3, "name": "dana"}));
        assert_eq!(
            serde_json::to_value(&principal).unwrap(),
            json!({"id": 3, "name": "dana"})
        );
    }
}
