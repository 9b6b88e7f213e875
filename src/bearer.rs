// src/bearer.rs

use crate::error::AuthError;
use crate::model::ClaimSet;
use serde::Serialize;

/// A caller whose bearer token passed validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    /// The verified claims of the presented token.
    pub claims: ClaimSet,
}

impl AuthenticatedUser {
    /// The `sub` claim identifying the caller.
    pub fn subject(&self) -> Option<&str> {
        self.claims.subject()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively (RFC 7235).
pub fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    let header = header.trim();
    let (scheme, credentials) = header.split_once(' ').unwrap_or((header, ""));

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return Err(AuthError::InvalidAuthorizationHeader(
            "expected the Bearer scheme".to_string(),
        ));
    }

    let token = credentials.trim();
    if token.is_empty() {
        return Err(AuthError::MissingBearerToken);
    }
    if token.contains(char::is_whitespace) {
        return Err(AuthError::InvalidAuthorizationHeader(
            "bearer credentials must be a single token".to_string(),
        ));
    }

    Ok(token)
}
