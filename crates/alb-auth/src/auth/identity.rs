//! Identity resolver contract.
//!
//! When the authenticator is configured not to return the token payload,
//! it maps claims to credentials and asks an [`IdentityResolver`] for the
//! application's own representation of the user.

use crate::auth::result::ResolverErrors;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// Credentials passed to a resolver: field name to claim value.
///
/// A field whose claim is absent or `null` maps to `None`.
pub type Credentials = BTreeMap<String, Option<String>>;

/// Looks up an identity from token-derived credentials.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Return the identity for `credentials`, or `None` if there is none.
    async fn identify(&self, credentials: &Credentials) -> Option<Value>;

    /// Errors recorded by the last [`identify`](Self::identify) call.
    fn errors(&self) -> ResolverErrors {
        ResolverErrors::new()
    }
}

type BoxedIdentify =
    dyn Fn(Credentials) -> Pin<Box<dyn Future<Output = Option<Value>> + Send>> + Send + Sync;

/// [`IdentityResolver`] backed by an async closure.
///
/// ```rust,ignore
/// let resolver = CallbackIdentityResolver::new(|credentials| async move {
///     let sub = credentials.get("sub").cloned().flatten()?;
///     users.find_by_subject(&sub).await.map(|user| json!(user))
/// });
/// ```
pub struct CallbackIdentityResolver {
    callback: Box<BoxedIdentify>,
}

impl CallbackIdentityResolver {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(Credentials) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Value>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |credentials| Box::pin(callback(credentials))),
        }
    }
}

#[async_trait]
impl IdentityResolver for CallbackIdentityResolver {
    async fn identify(&self, credentials: &Credentials) -> Option<Value> {
        (self.callback)(credentials.clone()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_callback_receives_credentials() {
        let resolver = CallbackIdentityResolver::new(|credentials: Credentials| async move {
            let sub = credentials.get("sub").cloned().flatten()?;
            Some(json!({"id": 7, "username": sub}))
        });

        let mut credentials = Credentials::new();
        credentials.insert("sub".to_string(), Some("alice".to_string()));

        assert_eq!(
            resolver.identify(&credentials).await,
            Some(json!({"id": 7, "username": "alice"}))
        );
        assert!(resolver.errors().is_empty());
    }

    #[tokio::test]
    async fn test_callback_miss() {
        let resolver = CallbackIdentityResolver::new(|_| async { None });
        assert_eq!(resolver.identify(&Credentials::new()).await, None);
    }
}
