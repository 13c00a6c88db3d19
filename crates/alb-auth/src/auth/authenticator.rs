//! The ALB token authenticator.
//!
//! Turns the identity header forwarded by the load balancer into an
//! [`AuthResult`]:
//!
//! 1. Read the configured header (missing or blank: credentials missing)
//! 2. Parse the compact token, including date claims (malformed: invalid)
//! 3. Require a usable `kid` header (absent: invalid, no diagnostic)
//! 4. Resolve the signing key through the cache
//! 5. Check the signed-with and valid-at constraints
//! 6. Require a subject (absent: credentials missing)
//! 7. Return the claims, or delegate to the identity resolver
//!
//! Nothing in the pipeline returns an error to the caller; every failure is
//! folded into the result.

use crate::auth::cache::{self, InMemoryKeyCache, KeyCache};
use crate::auth::claims::Claims;
use crate::auth::identity::{Credentials, IdentityResolver};
use crate::auth::jwt::TokenValidator;
use crate::auth::keys::SigningKeyResolver;
use crate::auth::result::{AuthResult, Principal};
use crate::config::{AlbAuthConfig, CacheBackend, ConfigError};
use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::{CompactToken, MAX_CLOCK_SKEW};
use http::{HeaderMap, HeaderName};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::instrument;

/// Outcome of [`AlbAuthenticator::authenticate_detailed`].
#[derive(Debug, Clone)]
pub struct Authentication {
    pub result: AuthResult,

    /// Claims of a token that passed signature and time validation, even
    /// when a later step rejected the request.
    pub payload: Option<Claims>,
}

/// Authenticates requests carrying an ALB identity token.
///
/// `Send + Sync`; share one instance across requests behind an `Arc`.
pub struct AlbAuthenticator {
    header: HeaderName,
    return_payload: bool,
    fields: BTreeMap<String, String>,
    keys: SigningKeyResolver,
    validator: TokenValidator,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    last_payload: RwLock<Option<Claims>>,
}

/// Builder for [`AlbAuthenticator`].
pub struct AlbAuthenticatorBuilder {
    config: AlbAuthConfig,
    identity_resolver: Option<Arc<dyn IdentityResolver>>,
    key_cache: Option<Arc<dyn KeyCache>>,
    http_client: Option<reqwest::Client>,
}

impl AlbAuthenticatorBuilder {
    /// Identity resolver used when `return_payload` is false.
    pub fn identity_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.identity_resolver = Some(resolver);
        self
    }

    /// Key cache to share. Defaults to a fresh in-memory cache.
    pub fn key_cache(mut self, cache: Arc<dyn KeyCache>) -> Self {
        self.key_cache = Some(cache);
        self
    }

    /// HTTP client for key fetches. Defaults to one built from `config.http`.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Build the authenticator.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidHeader`] if the header name is not a valid HTTP header
    /// - [`ConfigError::MissingIdentityResolver`] if delegation is configured
    ///   without a resolver
    /// - [`ConfigError::InvalidClockSkew`] if the clock skew exceeds [`MAX_CLOCK_SKEW`]
    /// - [`ConfigError::CacheBackend`] if the Redis backend is configured but
    ///   no cache was provided
    /// - any error from deriving the key endpoint or building the HTTP client
    pub fn build(self) -> Result<AlbAuthenticator, ConfigError> {
        let config = self.config;

        let header = HeaderName::from_bytes(config.header.as_bytes())
            .map_err(|e| ConfigError::InvalidHeader(format!("'{}': {e}", config.header)))?;

        if !config.return_payload && self.identity_resolver.is_none() {
            return Err(ConfigError::MissingIdentityResolver);
        }

        if config.clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::InvalidClockSkew(format!(
                "{}s must not exceed {}s",
                config.clock_skew.as_secs(),
                MAX_CLOCK_SKEW.as_secs()
            )));
        }

        let cache = match (self.key_cache, config.cache.backend) {
            (Some(cache), _) => cache,
            (None, CacheBackend::Memory) => Arc::new(InMemoryKeyCache::new()),
            (None, CacheBackend::Redis) => {
                return Err(ConfigError::CacheBackend(
                    "the redis backend must be connected before building; use AlbAuthenticator::from_config".to_string(),
                ))
            }
        };

        let keys = SigningKeyResolver::from_config(&config, cache, self.http_client)?;

        Ok(AlbAuthenticator {
            header,
            return_payload: config.return_payload,
            fields: config.fields,
            keys,
            validator: TokenValidator::new(config.clock_skew),
            identity_resolver: self.identity_resolver,
            last_payload: RwLock::new(None),
        })
    }
}

impl AlbAuthenticator {
    pub fn builder(config: AlbAuthConfig) -> AlbAuthenticatorBuilder {
        AlbAuthenticatorBuilder {
            config,
            identity_resolver: None,
            key_cache: None,
            http_client: None,
        }
    }

    /// Build an authenticator with the cache backend named in `config`.
    ///
    /// # Errors
    ///
    /// See [`AlbAuthenticatorBuilder::build`] and [`cache::from_config`].
    pub async fn from_config(
        config: AlbAuthConfig,
        identity_resolver: Option<Arc<dyn IdentityResolver>>,
    ) -> Result<Self, ConfigError> {
        let key_cache = cache::from_config(&config.cache).await?;
        let mut builder = Self::builder(config).key_cache(key_cache);
        if let Some(resolver) = identity_resolver {
            builder = builder.identity_resolver(resolver);
        }
        builder.build()
    }

    /// Authenticate a request and record its payload for [`last_payload`](Self::last_payload).
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthResult {
        self.store_payload(None);
        let Authentication { result, payload } = self.authenticate_detailed(headers).await;
        self.store_payload(payload);
        result
    }

    /// Authenticate a request without touching shared state.
    #[instrument(skip_all, name = "alb.auth.authenticate")]
    pub async fn authenticate_detailed(&self, headers: &HeaderMap) -> Authentication {
        let start = Instant::now();
        let (result, payload) = self.run(headers).await;

        tracing::debug!(
            target: "alb.auth.authenticator",
            status = %result.status(),
            "Authentication finished"
        );
        metrics::record_authentication(result.status().as_str(), start.elapsed());

        Authentication { result, payload }
    }

    /// Claims decoded by the most recent [`authenticate`](Self::authenticate) call.
    ///
    /// `None` unless that call's token passed signature and time validation.
    pub fn last_payload(&self) -> Option<Claims> {
        self.last_payload
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Header the token is read from.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn key_resolver(&self) -> &SigningKeyResolver {
        &self.keys
    }

    fn store_payload(&self, payload: Option<Claims>) {
        *self
            .last_payload
            .write()
            .unwrap_or_else(PoisonError::into_inner) = payload;
    }

    async fn run(&self, headers: &HeaderMap) -> (AuthResult, Option<Claims>) {
        let Some(raw) = self.token_from_headers(headers) else {
            tracing::debug!(target: "alb.auth.authenticator", header = %self.header, "Token header missing");
            return (AuthResult::CredentialsMissing, None);
        };

        let (token, claims) = match parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(target: "alb.auth.authenticator", error = %e, "Malformed token");
                return (AuthResult::CredentialsInvalid(Some(e)), None);
            }
        };

        let Some(kid) = token.kid().filter(|kid| is_usable_kid(kid)) else {
            tracing::debug!(target: "alb.auth.authenticator", "Token has no usable kid");
            return (AuthResult::CredentialsInvalid(None), None);
        };

        let key = match self.keys.resolve(kid).await {
            Ok(key) => key,
            Err(e) => return (AuthResult::CredentialsInvalid(Some(e.into())), None),
        };

        if let Err(e) = self.validator.validate(&token, &claims, &key) {
            return (AuthResult::CredentialsInvalid(Some(e)), None);
        }

        let payload = Some(claims.clone());

        if claims.subject().is_none() {
            tracing::debug!(target: "alb.auth.authenticator", "Verified token has no subject");
            return (AuthResult::CredentialsMissing, payload);
        }

        if self.return_payload {
            return (AuthResult::Success(Principal::Claims(claims)), payload);
        }

        (self.identify(&claims).await, payload)
    }

    fn token_from_headers<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    async fn identify(&self, claims: &Claims) -> AuthResult {
        // build() guarantees a resolver whenever return_payload is false
        let Some(resolver) = &self.identity_resolver else {
            return AuthResult::IdentityNotFound(Vec::new());
        };

        let credentials: Credentials = self
            .fields
            .iter()
            .map(|(field, claim)| (field.clone(), claims.credential(claim)))
            .collect();

        match resolver.identify(&credentials).await {
            Some(identity) if !is_empty_identity(&identity) => {
                AuthResult::Success(Principal::Identity(identity))
            }
            _ => {
                tracing::debug!(target: "alb.auth.authenticator", "Identity resolver found no match");
                AuthResult::IdentityNotFound(resolver.errors())
            }
        }
    }
}

fn parse(raw: &str) -> Result<(CompactToken, Claims), AuthError> {
    let token = CompactToken::parse(raw)?;
    let claims = Claims::from_map(token.claims().clone())?;
    Ok((token, claims))
}

/// `.` and `..` are dropped from URL paths and would address the endpoint root.
fn is_usable_kid(kid: &str) -> bool {
    !matches!(kid, "." | "..")
}

fn is_empty_identity(identity: &Value) -> bool {
    match identity {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(true) | Value::Number(_) => false,
    }
}
