//! Builder patterns for test tokens
//!
//! Produces compact ES256 tokens shaped like the ones the load balancer
//! forwards: `kid` in the header, `sub` plus time claims in the payload.

use crate::crypto_fixtures::TestSigningKey;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};

/// Encode a JSON value as one base64url token segment.
pub fn encode_segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(value.to_string())
}

/// Builder for creating signed test tokens
///
/// Defaults: `alg` ES256, `typ` JWT, `iat` and `nbf` at the builder's
/// reference time, `exp` one minute later, no `kid`, no `sub`.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .subject("gustavo@example.com")
///     .signed_by(&key);
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    now: DateTime<Utc>,
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a builder whose time claims are relative to the current time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a builder whose time claims are relative to `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        let mut header = Map::new();
        header.insert("alg".to_string(), json!("ES256"));
        header.insert("typ".to_string(), json!("JWT"));

        Self {
            now,
            header,
            claims: Map::new(),
        }
        .issued_at(now)
        .not_before(now)
        .expires_at(now + Duration::minutes(1))
    }

    /// Set the `kid` header.
    pub fn kid(self, kid: &str) -> Self {
        self.header("kid", kid)
    }

    pub fn without_kid(mut self) -> Self {
        self.header.remove("kid");
        self
    }

    /// Set an arbitrary header parameter.
    pub fn header(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.header.insert(name.to_string(), value.into());
        self
    }

    /// Set the `sub` claim.
    pub fn subject(self, subject: &str) -> Self {
        self.claim("sub", subject)
    }

    pub fn without_subject(self) -> Self {
        self.without_claim("sub")
    }

    /// Set an arbitrary claim.
    pub fn claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    pub fn issued_at(self, at: DateTime<Utc>) -> Self {
        self.claim("iat", at.timestamp())
    }

    pub fn not_before(self, at: DateTime<Utc>) -> Self {
        self.claim("nbf", at.timestamp())
    }

    pub fn expires_at(self, at: DateTime<Utc>) -> Self {
        self.claim("exp", at.timestamp())
    }

    /// Issued a day ago with a one-minute lifetime.
    pub fn expired(self) -> Self {
        let issued = self.now - Duration::days(1);
        self.issued_at(issued)
            .not_before(issued)
            .expires_at(issued + Duration::minutes(1))
    }

    pub fn without_time_claims(self) -> Self {
        self.without_claim("iat")
            .without_claim("nbf")
            .without_claim("exp")
    }

    /// The claims as a JSON object.
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with `key`, keeping whatever `kid` has been set.
    pub fn sign(self, key: &TestSigningKey) -> String {
        let signing_input = format!(
            "{}.{}",
            encode_segment(&Value::Object(self.header)),
            encode_segment(&Value::Object(self.claims))
        );
        let signature = key.sign(signing_input.as_bytes());
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
    }

    /// Set `kid` to the key's ID and sign with it.
    pub fn signed_by(self, key: &TestSigningKey) -> String {
        let kid = key.kid().to_string();
        self.kid(&kid).sign(key)
    }

    /// Produce an unsigned token (`alg: none`, empty signature).
    pub fn unsigned(self) -> String {
        let builder = self.header("alg", "none");
        format!(
            "{}.{}.",
            encode_segment(&Value::Object(builder.header)),
            encode_segment(&Value::Object(builder.claims))
        )
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(segment: &str) -> Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let now = Utc::now();
        let claims = TestTokenBuilder::at(now).claims();

        assert_eq!(claims["iat"], now.timestamp());
        assert_eq!(claims["nbf"], now.timestamp());
        assert_eq!(claims["exp"], now.timestamp() + 60);
        assert!(claims.get("sub").is_none());
    }

    #[test]
    fn test_signed_by_sets_kid() {
        let key = TestSigningKey::generate();
        let token = TestTokenBuilder::new().subject("alice").signed_by(&key);

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header = decode(parts[0]);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["kid"], key.kid());
        assert_eq!(decode(parts[1])["sub"], "alice");
    }

    #[test]
    fn test_expired_window_is_in_the_past() {
        let now = Utc::now();
        let claims = TestTokenBuilder::at(now).expired().claims();
        assert!(claims["exp"].as_i64().unwrap() < now.timestamp());
    }

    #[test]
    fn test_unsigned_has_empty_signature() {
        let token = TestTokenBuilder::new().subject("alice").unsigned();
        assert!(token.ends_with('.'));
        assert_eq!(decode(token.split('.').next().unwrap())["alg"], "none");
    }
}
