//! HTTP middleware for routes protected by ALB authentication.
//!
//! # Components
//!
//! - `auth` - authenticates the forwarded identity token

pub mod auth;

pub use auth::{require_alb_auth, AuthState, PrincipalExt};
