// src/lib.rs

//! Bearer token validation against an OpenID Connect provider.
//!
//! A [`Validator`](validator::Validator) fetches the provider's discovery
//! document (cached for a fixed TTL), resolves signing keys from its JWKS and
//! verifies JWT signatures and claims, returning the token's claim set.

pub mod bearer;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod model;
pub mod token;
pub mod validator;

/// The public prelude for the `symbiosis-auth` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::bearer::{extract_bearer_token, AuthenticatedUser};
    pub use crate::config::{Config, ConfigBuilder};
    pub use crate::error::AuthError;
    pub use crate::model::{ClaimSet, DiscoveryDocument};
    pub use crate::validator::Validator;
    pub use jsonwebtoken::Algorithm;
}
