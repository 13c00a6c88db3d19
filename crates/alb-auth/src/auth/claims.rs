//! Claims carried by a verified ALB identity token.
//!
//! The load balancer forwards whatever the identity provider put in the
//! user-info response, so claims stay an open JSON map. The recognized
//! temporal claims (`iat`, `nbf`, `exp`) are parsed up front so that a
//! malformed date is reported as a malformed token, before any key fetch.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Claim naming the authenticated principal.
pub const SUBJECT_CLAIM: &str = "sub";

/// A temporal claim is present but is not a numeric timestamp.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Value is not in the allowed date format: {claim}")]
pub struct InvalidDateClaim {
    pub claim: &'static str,
}

/// Decoded token claims.
///
/// Serializes as the plain claims object. The `sub` value is redacted in
/// Debug output to keep user identifiers out of logs.
#[derive(Clone, PartialEq)]
pub struct Claims {
    values: Map<String, Value>,
    issued_at: Option<DateTime<Utc>>,
    not_before: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iat", &self.issued_at)
            .field("nbf", &self.not_before)
            .field("exp", &self.expires_at)
            .field("keys", &keys)
            .finish()
    }
}

impl Serialize for Claims {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

impl Claims {
    /// Build claims from a decoded claims object.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDateClaim`] if `iat`, `nbf` or `exp` is present but
    /// is neither a number nor a numeric string.
    pub fn from_map(values: Map<String, Value>) -> Result<Self, InvalidDateClaim> {
        let issued_at = parse_date(&values, "iat")?;
        let not_before = parse_date(&values, "nbf")?;
        let expires_at = parse_date(&values, "exp")?;

        Ok(Self {
            values,
            issued_at,
            not_before,
            expires_at,
        })
    }

    /// The `sub` claim, if it is a non-empty string other than `"0"`.
    pub fn subject(&self) -> Option<&str> {
        self.values
            .get(SUBJECT_CLAIM)
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty() && *sub != "0")
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Raw claim value.
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.values.get(claim)
    }

    /// Claim value rendered for an identity lookup.
    ///
    /// Strings are passed through, other scalars and compound values are
    /// rendered as JSON. Absent and `null` claims yield `None`.
    pub fn credential(&self, claim: &str) -> Option<String> {
        match self.values.get(claim)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

fn parse_date(
    values: &Map<String, Value>,
    claim: &'static str,
) -> Result<Option<DateTime<Utc>>, InvalidDateClaim> {
    let invalid = InvalidDateClaim { claim };

    let timestamp = match values.get(claim) {
        None => return Ok(None),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(secs) => return DateTime::from_timestamp(secs, 0).map(Some).ok_or(invalid),
            None => n.as_f64().ok_or_else(|| invalid.clone())?,
        },
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid.clone())?,
        Some(_) => return Err(invalid),
    };

    from_fractional_seconds(timestamp).map(Some).ok_or(invalid)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_fractional_seconds(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() || timestamp.abs() > i64::MAX as f64 {
        return None;
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Result<Claims, InvalidDateClaim> {
        Claims::from_map(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn test_claims_debug_redacts_sub() {
        let claims = claims(json!({"sub": "gustavo@example.com", "exp": 1_700_000_000})).unwrap();
        let debug_str = format!("{claims:?}");

        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("gustavo@example.com"));
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let claims = claims(json!({"sub": "alice", "email": "a@example.com"})).unwrap();
        let value = serde_json::to_value(&claims).unwrap();

        assert_eq!(value, json!({"sub": "alice", "email": "a@example.com"}));
        assert_eq!(Value::Object(claims.into_map()), value);
    }

    #[test]
    fn test_integer_and_fractional_timestamps() {
        let claims = claims(json!({"iat": 1_700_000_000, "exp": 1_700_000_060.5})).unwrap();

        assert_eq!(claims.issued_at().unwrap().timestamp(), 1_700_000_000);
        let exp = claims.expires_at().unwrap();
        assert_eq!(exp.timestamp(), 1_700_000_060);
        assert_eq!(exp.timestamp_subsec_millis(), 500);
        assert!(claims.not_before().is_none());
    }

    #[test]
    fn test_numeric_string_timestamp_is_accepted() {
        let claims = claims(json!({"nbf": "1700000000"})).unwrap();
        assert_eq!(claims.not_before().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_non_numeric_date_is_rejected() {
        let err = claims(json!({"exp": "tomorrow"})).unwrap_err();
        assert_eq!(err.claim, "exp");
        assert_eq!(
            err.to_string(),
            "Value is not in the allowed date format: exp"
        );

        let err = claims(json!({"iat": true})).unwrap_err();
        assert_eq!(err.claim, "iat");
    }

    #[test]
    fn test_subject_requires_non_empty_string() {
        assert_eq!(claims(json!({"sub": "bob"})).unwrap().subject(), Some("bob"));
        assert_eq!(claims(json!({"sub": ""})).unwrap().subject(), None);
        assert_eq!(claims(json!({"sub": "0"})).unwrap().subject(), None);
        assert_eq!(claims(json!({"sub": "00"})).unwrap().subject(), Some("00"));
        assert_eq!(claims(json!({"sub": null})).unwrap().subject(), None);
        assert_eq!(claims(json!({"sub": 42})).unwrap().subject(), None);
        assert_eq!(claims(json!({})).unwrap().subject(), None);
    }

    #[test]
    fn test_credential_rendering() {
        let claims = claims(json!({
            "sub": "carol",
            "admin": true,
            "groups": ["a", "b"],
            "nothing": null
        }))
        .unwrap();

        assert_eq!(claims.credential("sub").as_deref(), Some("carol"));
        assert_eq!(claims.credential("admin").as_deref(), Some("true"));
        assert_eq!(claims.credential("groups").as_deref(), Some(r#"["a","b"]"#));
        assert_eq!(claims.credential("nothing"), None);
        assert_eq!(claims.credential("missing"), None);
    }
}
