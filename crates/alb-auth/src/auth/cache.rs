//! Key cache backends for the signing-key resolver.
//!
//! The load balancer rotates signing keys rarely and addresses each one by
//! `kid`, so a fetched key can be reused until its TTL runs out. The cache
//! is injected into [`SigningKeyResolver`](crate::auth::keys::SigningKeyResolver)
//! and shared by every request.
//!
//! # Backends
//!
//! - [`InMemoryKeyCache`] - per-process map, the default
//! - `RedisKeyCache` - shared across instances (cargo feature `redis`)
//!
//! A backend never fails the caller: read errors are misses and write
//! errors are dropped, so the resolver falls back to the key endpoint.

use crate::auth::keys::KeyMaterial;
use crate::config::{CacheBackend, CacheConfig, ConfigError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Storage for fetched key material, keyed by `kid`.
#[async_trait]
pub trait KeyCache: Send + Sync {
    /// Look up a key. Expired entries are misses.
    async fn get(&self, kid: &str) -> Option<KeyMaterial>;

    /// Store a key for `ttl`. Overwrites any previous entry.
    async fn insert(&self, kid: &str, key: KeyMaterial, ttl: Duration);
}

struct CachedKey {
    key: KeyMaterial,
    expires_at: Instant,
}

/// In-process key cache.
#[derive(Default)]
pub struct InMemoryKeyCache {
    entries: RwLock<HashMap<String, CachedKey>>,
}

impl InMemoryKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently stored, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyCache for InMemoryKeyCache {
    async fn get(&self, kid: &str) -> Option<KeyMaterial> {
        let entries = self.entries.read().await;
        entries
            .get(kid)
            .filter(|cached| cached.expires_at > Instant::now())
            .map(|cached| cached.key.clone())
    }

    async fn insert(&self, kid: &str, key: KeyMaterial, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        // Expired entries are only evicted here
        entries.retain(|_, cached| cached.expires_at > now);
        entries.insert(
            kid.to_string(),
            CachedKey {
                key,
                expires_at: now + ttl,
            },
        );
    }
}

#[cfg(feature = "redis")]
pub use self::redis_backend::RedisKeyCache;

#[cfg(feature = "redis")]
mod redis_backend {
    use super::KeyCache;
    use crate::auth::keys::KeyMaterial;
    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;
    use std::time::Duration;

    /// Redis key prefix for cached public keys.
    const KEY_PREFIX: &str = "alb-public-key:";

    /// Key cache shared through Redis.
    ///
    /// Entries expire server-side via `SET ... EX`.
    #[derive(Clone)]
    pub struct RedisKeyCache {
        connection: ConnectionManager,
    }

    impl RedisKeyCache {
        /// Connect to Redis at `url`.
        ///
        /// # Errors
        ///
        /// Returns the Redis error if the URL is invalid or the initial
        /// connection cannot be established.
        pub async fn connect(url: &str) -> redis::RedisResult<Self> {
            let client = redis::Client::open(url)?;
            let connection = ConnectionManager::new(client).await?;
            Ok(Self { connection })
        }

        pub fn from_connection(connection: ConnectionManager) -> Self {
            Self { connection }
        }

        fn cache_key(kid: &str) -> String {
            format!("{KEY_PREFIX}{kid}")
        }
    }

    #[async_trait]
    impl KeyCache for RedisKeyCache {
        async fn get(&self, kid: &str) -> Option<KeyMaterial> {
            let mut conn = self.connection.clone();
            match conn.get::<_, Option<String>>(Self::cache_key(kid)).await {
                Ok(value) => value.map(KeyMaterial::from),
                Err(e) => {
                    tracing::warn!(target: "alb.auth.cache", error = %e, "Redis key cache read failed");
                    None
                }
            }
        }

        async fn insert(&self, kid: &str, key: KeyMaterial, ttl: Duration) {
            let mut conn = self.connection.clone();
            let seconds = ttl.as_secs().max(1);
            if let Err(e) = conn
                .set_ex::<_, _, ()>(Self::cache_key(kid), key.as_str(), seconds)
                .await
            {
                tracing::warn!(target: "alb.auth.cache", error = %e, "Redis key cache write failed");
            }
        }
    }
}

/// Build the cache backend selected by `config`.
///
/// # Errors
///
/// Returns [`ConfigError::CacheBackend`] if the Redis backend is selected
/// without a URL, cannot connect, or the crate was built without the
/// `redis` feature.
pub async fn from_config(config: &CacheConfig) -> Result<Arc<dyn KeyCache>, ConfigError> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemoryKeyCache::new())),
        CacheBackend::Redis => redis_from_config(config).await,
    }
}

#[cfg(feature = "redis")]
async fn redis_from_config(config: &CacheConfig) -> Result<Arc<dyn KeyCache>, ConfigError> {
    use common::secret::ExposeSecret;

    let url = config.redis_url.as_ref().ok_or_else(|| {
        ConfigError::CacheBackend(
            "ALB_KEY_CACHE_REDIS_URL is required for the redis backend".to_string(),
        )
    })?;

    let cache = RedisKeyCache::connect(url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(target: "alb.auth.cache", error = %e, "Failed to connect to Redis");
            ConfigError::CacheBackend(format!("failed to connect to Redis: {e}"))
        })?;

    tracing::info!(target: "alb.auth.cache", "Using Redis key cache");
    Ok(Arc::new(cache))
}

#[cfg(not(feature = "redis"))]
async fn redis_from_config(_config: &CacheConfig) -> Result<Arc<dyn KeyCache>, ConfigError> {
    Err(ConfigError::CacheBackend(
        "the redis backend requires building with the `redis` feature".to_string(),
    ))
}
