//! Authentication of ALB-forwarded identity tokens.
//!
//! # Components
//!
//! - `authenticator` - the request pipeline producing an [`AuthResult`]
//! - `cache` - key cache abstraction and backends
//! - `claims` - verified token claims
//! - `identity` - identity resolver contract for delegated lookups
//! - `jwt` - signature and time constraint validation
//! - `keys` - signing-key resolver (fetch + cache by `kid`)
//! - `result` - authentication outcome types

pub mod authenticator;
pub mod cache;
pub mod claims;
pub mod identity;
pub mod jwt;
pub mod keys;
pub mod result;

pub use authenticator::{AlbAuthenticator, AlbAuthenticatorBuilder, Authentication};
pub use cache::{InMemoryKeyCache, KeyCache};
pub use claims::Claims;
pub use identity::{CallbackIdentityResolver, Credentials, IdentityResolver};
pub use jwt::TokenValidator;
pub use keys::{KeyMaterial, SigningKeyResolver};
pub use result::{AuthResult, AuthStatus, Principal, ResolverErrors};
