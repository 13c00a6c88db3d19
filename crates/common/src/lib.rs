//! Common utilities and types shared across the ALB authentication crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for compact JWS framing (size limits, segment decoding, `kid`)
pub mod jwt;
