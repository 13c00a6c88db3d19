//! # ALB Test Utilities
//!
//! Shared test utilities for the ALB authenticator.
//!
//! This crate provides:
//! - ES256 signing keys with matching PEM public keys
//! - A token builder producing signed compact tokens
//! - A mock public key endpoint on `wiremock`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use alb_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestSigningKey::generate();
//!     let server = MockKeyServer::start().await;
//!     server.serve_key(&key).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .subject("alice")
//!         .signed_by(&key);
//! }
//! ```

pub mod crypto_fixtures;
pub mod key_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use key_server::*;
pub use token_builders::*;
