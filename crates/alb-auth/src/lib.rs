//! ALB identity-token authentication.
//!
//! Verifies the ES256-signed token an application load balancer forwards
//! after OIDC login, and turns it into an authentication decision:
//!
//! - Signing keys are fetched by `kid` from the load balancer's public key
//!   endpoint and cached with a TTL
//! - Signature, `iat`, `nbf` and `exp` are checked with optional leeway
//! - The principal is either the verified claims or an identity looked up
//!   through an application-supplied resolver
//!
//! # Modules
//!
//! - `auth` - token pipeline, key resolver, cache, result types
//! - `config` - configuration from code or environment
//! - `errors` - error types and the HTTP rejection mapping
//! - `middleware` - axum middleware for protected routes
//! - `observability` - metrics helpers
//! - `routes` - router for the `alb-whoami` reference service

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod observability;
pub mod routes;

pub use auth::{AlbAuthenticator, AuthResult, AuthStatus, Claims, Principal};
pub use config::{AlbAuthConfig, ConfigError};
