//! ALB authenticator configuration.
//!
//! Configuration is built in code with the `with_*` methods or loaded from
//! environment variables. The Redis URL is a secret and is redacted in
//! Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Header the load balancer forwards the identity token in.
pub const DEFAULT_HEADER: &str = "x-amzn-oidc-data";

/// Default connect timeout for key fetches in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;

/// Default total timeout for key fetches in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default key cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// HTTP client settings for key fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub follow_redirects: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            follow_redirects: false,
        }
    }
}

/// Key cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Key cache settings.
#[derive(Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub ttl: Duration,

    /// Redis connection URL, may embed credentials.
    pub redis_url: Option<SecretString>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            redis_url: None,
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("backend", &self.backend)
            .field("ttl", &self.ttl)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Authenticator configuration.
#[derive(Debug, Clone)]
pub struct AlbAuthConfig {
    /// Header the token is read from (default: `x-amzn-oidc-data`).
    pub header: String,

    /// Return the verified claims as the principal. When false, claims are
    /// mapped through `fields` and passed to the identity resolver.
    pub return_payload: bool,

    /// Credential field name to claim name (default: `sub` to `sub`).
    pub fields: BTreeMap<String, String>,

    /// Base URL of the key endpoint. Overrides `region` when set.
    pub public_key_endpoint: Option<String>,

    /// Region used to derive the default key endpoint.
    pub region: Option<String>,

    pub http: HttpClientConfig,

    pub cache: CacheConfig,

    /// Leeway applied to `iat`, `nbf` and `exp`.
    pub clock_skew: Duration,
}

impl Default for AlbAuthConfig {
    fn default() -> Self {
        Self {
            header: DEFAULT_HEADER.to_string(),
            return_payload: true,
            fields: BTreeMap::from([("sub".to_string(), "sub".to_string())]),
            public_key_endpoint: None,
            region: None,
            http: HttpClientConfig::default(),
            cache: CacheConfig::default(),
            clock_skew: DEFAULT_CLOCK_SKEW,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No public key endpoint: set ALB_PUBLIC_KEY_ENDPOINT or a region")]
    MissingKeyEndpoint,

    #[error("Invalid public key endpoint: {0}")]
    InvalidKeyEndpoint(String),

    #[error("Invalid token header name: {0}")]
    InvalidHeader(String),

    #[error("An identity resolver is required when return_payload is false")]
    MissingIdentityResolver,

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),

    #[error("Invalid fields configuration: {0}")]
    InvalidFields(String),

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid key cache configuration: {0}")]
    InvalidCache(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Key cache backend unavailable: {0}")]
    CacheBackend(String),
}

impl AlbAuthConfig {
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_return_payload(mut self, return_payload: bool) -> Self {
        self.return_payload = return_payload;
        self
    }

    /// Replace the credential field mapping.
    pub fn with_fields<I, F, C>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (F, C)>,
        F: Into<String>,
        C: Into<String>,
    {
        self.fields = fields
            .into_iter()
            .map(|(field, claim)| (field.into(), claim.into()))
            .collect();
        self
    }

    pub fn with_public_key_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.public_key_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_http(mut self, http: HttpClientConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl = ttl;
        self
    }

    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Base URL keys are fetched from.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKeyEndpoint`] if neither an endpoint
    /// nor a region is configured.
    pub fn key_endpoint_base(&self) -> Result<String, ConfigError> {
        if let Some(endpoint) = non_empty(self.public_key_endpoint.as_deref()) {
            return Ok(endpoint.to_string());
        }
        match non_empty(self.region.as_deref()) {
            Some(region) => Ok(format!("https://public-keys.auth.elb.{region}.amazonaws.com")),
            None => Err(ConfigError::MissingKeyEndpoint),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |name: &str| non_empty(vars.get(name).map(String::as_str));

        let header = get("ALB_AUTH_HEADER")
            .map(str::to_string)
            .unwrap_or(defaults.header);

        let return_payload = match get("ALB_AUTH_RETURN_PAYLOAD") {
            Some(value) => parse_bool("ALB_AUTH_RETURN_PAYLOAD", value)?,
            None => defaults.return_payload,
        };

        let fields = match get("ALB_AUTH_FIELDS") {
            Some(value) => parse_fields(value)?,
            None => defaults.fields,
        };

        let public_key_endpoint = get("ALB_PUBLIC_KEY_ENDPOINT").map(str::to_string);

        let region = ["ALB_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"]
            .into_iter()
            .find_map(get)
            .map(str::to_string);

        let connect_timeout = match get("ALB_KEY_CONNECT_TIMEOUT_MS") {
            Some(value) => parse_timeout_ms("ALB_KEY_CONNECT_TIMEOUT_MS", value)?,
            None => defaults.http.connect_timeout,
        };

        let timeout = match get("ALB_KEY_TIMEOUT_MS") {
            Some(value) => parse_timeout_ms("ALB_KEY_TIMEOUT_MS", value)?,
            None => defaults.http.timeout,
        };

        let follow_redirects = match get("ALB_KEY_FOLLOW_REDIRECTS") {
            Some(value) => parse_bool("ALB_KEY_FOLLOW_REDIRECTS", value)?,
            None => defaults.http.follow_redirects,
        };

        let backend = match get("ALB_KEY_CACHE_BACKEND") {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "memory" => CacheBackend::Memory,
                "redis" => CacheBackend::Redis,
                other => {
                    return Err(ConfigError::InvalidCache(format!(
                        "ALB_KEY_CACHE_BACKEND must be 'memory' or 'redis', got '{other}'"
                    )))
                }
            },
            None => defaults.cache.backend,
        };

        let ttl = if let Some(value_str) = get("ALB_KEY_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCache(format!(
                    "ALB_KEY_CACHE_TTL_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCache(
                    "ALB_KEY_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            Duration::from_secs(value)
        } else {
            defaults.cache.ttl
        };

        let redis_url = get("ALB_KEY_CACHE_REDIS_URL").map(SecretString::from);

        if backend == CacheBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::InvalidCache(
                "ALB_KEY_CACHE_REDIS_URL is required when ALB_KEY_CACHE_BACKEND is 'redis'"
                    .to_string(),
            ));
        }

        // Parse JWT clock skew tolerance with validation
        let clock_skew = if let Some(value_str) = get("ALB_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidClockSkew(format!(
                    "ALB_CLOCK_SKEW_SECONDS must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidClockSkew(format!(
                    "ALB_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            Duration::from_secs(value)
        } else {
            defaults.clock_skew
        };

        Ok(Self {
            header,
            return_payload,
            fields,
            public_key_endpoint,
            region,
            http: HttpClientConfig {
                connect_timeout,
                timeout,
                follow_redirects,
            },
            cache: CacheConfig {
                backend,
                ttl,
                redis_url,
            },
            clock_skew,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool(format!(
            "{name} must be true or false, got '{value}'"
        ))),
    }
}

fn parse_timeout_ms(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let millis: u64 = value.parse().map_err(|e| {
        ConfigError::InvalidTimeout(format!(
            "{name} must be a valid positive integer, got '{value}': {e}"
        ))
    })?;

    if millis == 0 {
        return Err(ConfigError::InvalidTimeout(format!(
            "{name} must be greater than 0"
        )));
    }

    Ok(Duration::from_millis(millis))
}

/// Parse `field=claim` pairs separated by commas.
fn parse_fields(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut fields = BTreeMap::new();

    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (field, claim) = pair
            .split_once('=')
            .map(|(f, c)| (f.trim(), c.trim()))
            .filter(|(f, c)| !f.is_empty() && !c.is_empty())
            .ok_or_else(|| {
                ConfigError::InvalidFields(format!(
                    "ALB_AUTH_FIELDS entries must look like field=claim, got '{pair}'"
                ))
            })?;
        fields.insert(field.to_string(), claim.to_string());
    }

    if fields.is_empty() {
        return Err(ConfigError::InvalidFields(
            "ALB_AUTH_FIELDS must map at least one field".to_string(),
        ));
    }

    Ok(fields)
}
