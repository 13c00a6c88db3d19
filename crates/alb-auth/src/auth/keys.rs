//! Signing-key resolver for ALB identity tokens.
//!
//! The load balancer publishes one PEM-encoded public key per `kid` at
//! `https://public-keys.auth.elb.<region>.amazonaws.com/<kid>`. Keys are
//! fetched on demand and kept in a [`KeyCache`] for a bounded TTL.
//!
//! # Security
//!
//! - Redirects are not followed by default
//! - Connect and total timeouts bound every fetch (1s each by default)
//! - Failed fetches are never cached, so an outage heals on the next request
//! - The `kid` is pushed as a single percent-encoded path segment and cannot
//!   escape the configured base path

use crate::auth::cache::KeyCache;
use crate::config::{AlbAuthConfig, ConfigError, HttpClientConfig};
use crate::errors::KeyFetchError;
use crate::observability::metrics;
use reqwest::{redirect, Url};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Maximum redirects followed when redirects are enabled.
const MAX_REDIRECTS: usize = 5;

/// PEM key material as returned by the key endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<String> for KeyMaterial {
    fn from(pem: String) -> Self {
        Self(pem)
    }
}

impl From<&str> for KeyMaterial {
    fn from(pem: &str) -> Self {
        Self(pem.to_string())
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial({} bytes)", self.0.len())
    }
}

/// Build the HTTP client used for key fetches.
///
/// # Errors
///
/// Returns [`ConfigError::HttpClient`] if the TLS backend cannot be initialized.
pub fn build_http_client(config: &HttpClientConfig) -> Result<reqwest::Client, ConfigError> {
    let policy = if config.follow_redirects {
        redirect::Policy::limited(MAX_REDIRECTS)
    } else {
        redirect::Policy::none()
    };

    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.timeout)
        .redirect(policy)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

/// Resolves a `kid` to its public key, through the cache.
pub struct SigningKeyResolver {
    base_url: Url,
    http_client: reqwest::Client,
    cache: Arc<dyn KeyCache>,
    cache_ttl: Duration,
}

impl SigningKeyResolver {
    /// Create a resolver for keys published under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyEndpoint`] if `base_url` is not an
    /// absolute http(s) URL.
    pub fn new(
        base_url: &str,
        http_client: reqwest::Client,
        cache: Arc<dyn KeyCache>,
        cache_ttl: Duration,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidKeyEndpoint(format!("'{base_url}': {e}")))?;

        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidKeyEndpoint(format!(
                "'{base_url}' is not an http(s) base URL"
            )));
        }

        Ok(Self {
            base_url,
            http_client,
            cache,
            cache_ttl,
        })
    }

    /// Create a resolver from configuration.
    ///
    /// A `http_client` passed in is used as-is; otherwise one is built from
    /// `config.http`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if no key endpoint can be derived or the
    /// HTTP client cannot be built.
    pub fn from_config(
        config: &AlbAuthConfig,
        cache: Arc<dyn KeyCache>,
        http_client: Option<reqwest::Client>,
    ) -> Result<Self, ConfigError> {
        let base_url = config.key_endpoint_base()?;
        let http_client = match http_client {
            Some(client) => client,
            None => build_http_client(&config.http)?,
        };
        Self::new(&base_url, http_client, cache, config.cache.ttl)
    }

    /// URL of the key identified by `kid`.
    ///
    /// # Errors
    ///
    /// - [`KeyFetchError::InvalidKid`] for the `.` and `..` dot segments
    /// - [`KeyFetchError::InvalidEndpoint`] if the base URL cannot take path
    ///   segments
    pub fn key_url(&self, kid: &str) -> Result<Url, KeyFetchError> {
        if matches!(kid, "." | "..") {
            return Err(KeyFetchError::InvalidKid(kid.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| KeyFetchError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .push(kid);
        Ok(url)
    }

    /// Return the key for `kid`, fetching it on a cache miss.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFetchError`] if the key is not cached and cannot be
    /// fetched. Nothing is cached in that case.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<KeyMaterial, KeyFetchError> {
        if let Some(key) = self.cache.get(kid).await {
            tracing::debug!(target: "alb.auth.keys", "Public key cache hit");
            metrics::record_key_cache("hit");
            return Ok(key);
        }
        metrics::record_key_cache("miss");

        let url = self.key_url(kid)?;
        let key = self.fetch(&url).await?;

        self.cache.insert(kid, key.clone(), self.cache_ttl).await;
        Ok(key)
    }

    /// Fetch a key from `url`, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`KeyFetchError`] for timeouts, transport failures, non-2xx
    /// responses, or an unreadable body.
    pub async fn fetch(&self, url: &Url) -> Result<KeyMaterial, KeyFetchError> {
        tracing::debug!(target: "alb.auth.keys", url = %url, "Fetching public key");
        let start = Instant::now();

        let result = self.send(url).await;

        let status = match &result {
            Ok(_) => "success",
            Err(KeyFetchError::Timeout { .. }) => "timeout",
            Err(_) => "error",
        };
        metrics::record_key_fetch(status, start.elapsed());

        result
    }

    async fn send(&self, url: &Url) -> Result<KeyMaterial, KeyFetchError> {
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "alb.auth.keys", url = %url, error = %e, "Public key request failed");
                request_error(url, &e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "alb.auth.keys",
                url = %url,
                status = %status,
                "Public key endpoint returned error"
            );
            return Err(KeyFetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.text().await.map_err(|e| {
            tracing::warn!(target: "alb.auth.keys", url = %url, error = %e, "Failed to read public key body");
            if e.is_timeout() {
                KeyFetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                KeyFetchError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        tracing::debug!(target: "alb.auth.keys", url = %url, "Public key fetched");
        Ok(KeyMaterial(body))
    }
}

fn request_error(url: &Url, error: &reqwest::Error) -> KeyFetchError {
    if error.is_timeout() {
        KeyFetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        KeyFetchError::Transport {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::cache::InMemoryKeyCache;

    fn resolver(base_url: &str) -> SigningKeyResolver {
        SigningKeyResolver::new(
            base_url,
            build_http_client(&HttpClientConfig::default()).unwrap(),
            Arc::new(InMemoryKeyCache::new()),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    #[test]
    fn test_key_url_appends_kid() {
        let resolver = resolver("https://public-keys.auth.elb.eu-south-1.amazonaws.com");
        assert_eq!(
            resolver.key_url("abc-123").unwrap().as_str(),
            "https://public-keys.auth.elb.eu-south-1.amazonaws.com/abc-123"
        );
    }

    #[test]
    fn test_key_url_keeps_base_path_and_trailing_slash() {
        let resolver = resolver("http://127.0.0.1:9000/keys/");
        assert_eq!(
            resolver.key_url("abc").unwrap().as_str(),
            "http://127.0.0.1:9000/keys/abc"
        );

        let resolver = self::resolver("http://127.0.0.1:9000/keys");
        assert_eq!(
            resolver.key_url("abc").unwrap().as_str(),
            "http://127.0.0.1:9000/keys/abc"
        );
    }

    #[test]
    fn test_key_url_encodes_kid_as_one_segment() {
        let resolver = resolver("https://keys.example.com");
        assert_eq!(
            resolver.key_url("../a/b?c").unwrap().as_str(),
            "https://keys.example.com/..%2Fa%2Fb%3Fc"
        );
    }

    #[test]
    fn test_key_url_rejects_dot_segments() {
        let resolver = resolver("https://keys.example.com/keys/");
        for kid in [".", ".."] {
            assert_eq!(
                resolver.key_url(kid),
                Err(KeyFetchError::InvalidKid(kid.to_string()))
            );
        }
    }

    #[tokio::test]
    async fn test_dot_segment_kid_is_never_fetched() {
        // Unroutable endpoint: a fetch would surface as a transport error.
        let resolver = resolver("http://127.0.0.1:1/keys");
        assert!(matches!(
            resolver.resolve("..").await,
            Err(KeyFetchError::InvalidKid(_))
        ));
    }

    #[test]
    fn test_new_rejects_non_http_base() {
        let cache: Arc<dyn KeyCache> = Arc::new(InMemoryKeyCache::new());
        let client = reqwest::Client::new();

        for base in ["not a url", "mailto:keys@example.com", "ftp://keys.example.com"] {
            let result =
                SigningKeyResolver::new(base, client.clone(), cache.clone(), Duration::ZERO);
            assert!(
                matches!(result, Err(ConfigError::InvalidKeyEndpoint(_))),
                "{base} should be rejected"
            );
        }
    }

    #[test]
    fn test_key_material_debug_hides_content() {
        let key = KeyMaterial::from("-----BEGIN PUBLIC KEY-----");
        assert_eq!(format!("{key:?}"), "KeyMaterial(26 bytes)");
    }

    #[tokio::test]
    async fn test_cached_key_skips_network() {
        let cache = Arc::new(InMemoryKeyCache::new());
        cache
            .insert("kid", KeyMaterial::from("pem"), Duration::from_secs(60))
            .await;

        // Unroutable endpoint: any fetch attempt would fail.
        let resolver = SigningKeyResolver::new(
            "http://127.0.0.1:1",
            reqwest::Client::new(),
            cache,
            Duration::from_secs(60),
        )
        .unwrap();

        assert_eq!(resolver.resolve("kid").await.unwrap().as_str(), "pem");
    }
}
