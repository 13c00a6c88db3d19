//! Secret types for values that must never reach logs.
//!
//! Re-exports [`secrecy`] types. In this workspace they wrap cache backend
//! URLs, since a Redis URL may embed `:password@`.
//!
//! `SecretString` implements `Debug` with redaction, so a struct deriving
//! `Debug` stays safe to log. The value is zeroized on drop and only
//! reachable through [`ExposeSecret::expose_secret`].
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct CacheSettings {
//!     backend: String,
//!     url: SecretString,
//! }
//!
//! let settings = CacheSettings {
//!     backend: "redis".to_string(),
//!     url: SecretString::from("redis://:hunter2@cache:6379"),
//! };
//!
//! assert!(!format!("{settings:?}").contains("hunter2"));
//! assert_eq!(settings.url.expose_secret(), "redis://:hunter2@cache:6379");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("redis://:hunter2@localhost:6379");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("token-value");
        assert_eq!(secret.expose_secret(), "token-value");
    }

    #[test]
    fn test_deserialize_keeps_value_hidden() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct CacheSettings {
            backend: String,
            url: SecretString,
        }

        let json = r#"{"backend": "redis", "url": "redis://:pw@cache:6379"}"#;
        let settings: CacheSettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(settings.url.expose_secret(), "redis://:pw@cache:6379");

        let debug = format!("{settings:?}");
        assert!(debug.contains("redis"));
        assert!(!debug.contains(":pw@"));
    }
}
