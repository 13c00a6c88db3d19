//! Compact JWS framing shared by the ALB authentication crates.
//!
//! This module provides the structural layer of token handling:
//! - Size limits for DoS prevention
//! - Clock skew constants for temporal validation
//! - Splitting a compact token into header / claims / signature segments
//! - base64url and JSON decoding of each segment
//! - Key ID extraction from the decoded header
//!
//! Nothing here verifies signatures or timestamps. A [`CompactToken`] is
//! untrusted data until the caller has checked it against a resolved key.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::CompactToken;
//!
//! let token = CompactToken::parse(raw)?;
//! let kid = token.kid().ok_or("token has no usable kid")?;
//! // fetch key for `kid`, then verify `token.signing_input()` against
//! // `token.encoded_signature()`
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted token size in bytes (16KB).
///
/// The load balancer caps forwarded user claims at roughly 11KB, so anything
/// past 16KB is rejected before base64 decoding or JSON parsing takes place.
pub const MAX_JWT_SIZE_BYTES: usize = 16 * 1024;

/// Default clock skew leeway applied to `iat`, `nbf` and `exp`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::ZERO;

/// Maximum allowed clock skew leeway (10 minutes).
///
/// Guards against misconfiguration that would keep expired tokens usable.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Token segment names, used in parse diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Claims,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Header => f.write_str("header"),
            Segment::Claims => f.write_str("claims"),
        }
    }
}

/// Errors raised while parsing the compact serialization.
///
/// Messages are returned to callers as diagnostics, so they describe the
/// structural problem without echoing any token content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenParseError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The JWT string exceeds the maximum allowed size")]
    TokenTooLarge,

    /// Token does not have exactly three segments.
    #[error("The JWT string must have two dots")]
    WrongSegmentCount,

    /// First segment is empty.
    #[error("The JWT string is missing the Header part")]
    MissingHeader,

    /// Second segment is empty.
    #[error("The JWT string is missing the Claim part")]
    MissingClaims,

    /// A segment is not valid unpadded base64url.
    #[error("Error while decoding from Base64Url, invalid base64 characters detected")]
    InvalidBase64,

    /// A segment did not decode to valid JSON.
    #[error("Error while decoding from JSON")]
    InvalidJson,

    /// A segment decoded to JSON that is not an object.
    #[error("The token {0} must be a JSON object")]
    NotAnObject(Segment),
}

// =============================================================================
// Compact token
// =============================================================================

/// A structurally valid, unverified compact JWS.
#[derive(Clone)]
pub struct CompactToken {
    header: Map<String, Value>,
    claims: Map<String, Value>,
    signature: Vec<u8>,
    signing_input: String,
    encoded_signature: String,
}

/// Claims and signature are omitted from Debug output; only the header is shown.
impl fmt::Debug for CompactToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompactToken")
            .field("header", &self.header)
            .field("claims", &format_args!("[{} claims]", self.claims.len()))
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

impl CompactToken {
    /// Parse a compact JWS into its three decoded segments.
    ///
    /// # Security
    ///
    /// - Token size is checked BEFORE any decoding (denial-of-service prevention)
    /// - The signature is decoded but NOT verified
    ///
    /// # Errors
    ///
    /// Returns a [`TokenParseError`] describing the first structural problem
    /// found: size, segment count, empty segments, base64url, JSON, or a
    /// segment that is not a JSON object.
    pub fn parse(token: &str) -> Result<Self, TokenParseError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "common.jwt",
                token_size = token.len(),
                max_size = MAX_JWT_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(TokenParseError::TokenTooLarge);
        }

        let parts: Vec<&str> = token.split('.').collect();
        let [header_part, claims_part, signature_part] = parts.as_slice() else {
            tracing::debug!(
                target: "common.jwt",
                parts = parts.len(),
                "Token rejected: invalid JWT format"
            );
            return Err(TokenParseError::WrongSegmentCount);
        };

        if header_part.is_empty() {
            return Err(TokenParseError::MissingHeader);
        }
        if claims_part.is_empty() {
            return Err(TokenParseError::MissingClaims);
        }

        let header = decode_object(header_part, Segment::Header)?;
        let claims = decode_object(claims_part, Segment::Claims)?;
        let signature = decode_segment(signature_part)?;

        Ok(Self {
            header,
            claims,
            signature,
            signing_input: format!("{header_part}.{claims_part}"),
            encoded_signature: signature_part.trim_end_matches('=').to_string(),
        })
    }

    /// Decoded header object.
    #[must_use]
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// Decoded claims object.
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Consume the token, keeping only the claims.
    #[must_use]
    pub fn into_claims(self) -> Map<String, Value> {
        self.claims
    }

    /// The `kid` header, if present as a non-empty string.
    ///
    /// Numbers, nulls and empty strings are all treated as absent.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.header
            .get("kid")
            .and_then(Value::as_str)
            .filter(|kid| !kid.is_empty())
    }

    /// The `alg` header, if present as a string.
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.header.get("alg").and_then(Value::as_str)
    }

    /// Raw signature bytes.
    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Signature segment as it appeared on the wire, without padding.
    #[must_use]
    pub fn encoded_signature(&self) -> &str {
        &self.encoded_signature
    }

    /// The bytes covered by the signature: `<header>.<claims>` as encoded.
    #[must_use]
    pub fn signing_input(&self) -> &[u8] {
        self.signing_input.as_bytes()
    }
}

// =============================================================================
// Functions
// =============================================================================

/// Decode one base64url segment.
///
/// Trailing `=` padding is tolerated and stripped before decoding.
///
/// # Errors
///
/// Returns [`TokenParseError::InvalidBase64`] if the segment is not valid
/// base64url.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenParseError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to decode token segment base64");
            TokenParseError::InvalidBase64
        })
}

fn decode_object(segment: &str, which: Segment) -> Result<Map<String, Value>, TokenParseError> {
    let bytes = decode_segment(segment)?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", segment = %which, error = %e, "Failed to parse token segment JSON");
        TokenParseError::InvalidJson
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(TokenParseError::NotAnObject(which)),
    }
}

// =============================================================================
// Tests
// =============================================================================
