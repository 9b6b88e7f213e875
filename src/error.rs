// src/error.rs

use thiserror::Error;

/// The primary error type for the `symbiosis-auth` library.
///
/// Every variant carries plain strings so the error is `Clone` and can be
/// shared between callers waiting on the same discovery fetch. Messages
/// never contain the bearer token or key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The input is not a syntactically well-formed JWT.
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The discovery endpoint was unreachable, timed out or returned an error status.
    #[error("OIDC discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The discovery document is missing required fields or cannot be parsed.
    #[error("Invalid OIDC discovery document: {0}")]
    InvalidDiscoveryDocument(String),

    /// The JWKS endpoint was unreachable, timed out or returned an error status.
    #[error("JWKS endpoint unavailable: {0}")]
    JwksUnavailable(String),

    /// The JWKS endpoint returned a body that is not a key set.
    #[error("Invalid JSON Web Key Set: {0}")]
    InvalidKeySet(String),

    /// The JWT header is missing the 'kid' (Key ID) field.
    #[error("The JWT header is missing the 'kid' (Key ID) field")]
    MissingKeyId,

    /// No key with the token's 'kid' exists in the current key set.
    #[error("Unknown signing key for kid: {0}")]
    UnknownSigningKey(String),

    /// The signature did not verify, or the algorithm is not permitted.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// The 'exp' claim is not in the future.
    #[error("Token has expired")]
    TokenExpired,

    /// The 'nbf' claim is in the future.
    #[error("Token is not yet valid")]
    TokenNotYetValid,

    /// The 'iss' claim does not match the discovered issuer.
    #[error("Token issuer does not match the expected issuer")]
    IssuerMismatch,

    /// The 'aud' claim does not contain the expected audience.
    #[error("Token audience does not contain the expected audience")]
    AudienceMismatch,

    /// A required registered claim is absent.
    #[error("A required claim is missing from the token: {0}")]
    MissingClaim(String),

    /// The claims could not be verified for any other reason.
    #[error("Invalid token claims: {0}")]
    InvalidClaims(String),

    /// No bearer token was supplied with the request.
    #[error("A bearer token is required")]
    MissingBearerToken,

    /// The Authorization header does not use the Bearer scheme.
    #[error("Invalid Authorization header: {0}")]
    InvalidAuthorizationHeader(String),
}

impl AuthError {
    /// Whether the failure was caused by the identity provider being
    /// unreachable rather than by the token itself.
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(
            self,
            AuthError::DiscoveryUnavailable(_) | AuthError::JwksUnavailable(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidIssuer => AuthError::IssuerMismatch,
            ErrorKind::InvalidAudience => AuthError::AudienceMismatch,
            ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "iss" => AuthError::IssuerMismatch,
                "aud" => AuthError::AudienceMismatch,
                other => AuthError::MissingClaim(other.to_string()),
            },
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::Crypto(_) => AuthError::InvalidSignature(err.to_string()),
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Utf8(_) => AuthError::MalformedToken(err.to_string()),
            _ => AuthError::InvalidClaims(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::{Error, ErrorKind};

    #[test]
    fn test_claim_failures_map_to_their_kinds() {
        assert_eq!(AuthError::from(Error::from(ErrorKind::ExpiredSignature)), AuthError::TokenExpired);
        assert_eq!(AuthError::from(Error::from(ErrorKind::InvalidIssuer)), AuthError::IssuerMismatch);
        assert_eq!(AuthError::from(Error::from(ErrorKind::InvalidAudience)), AuthError::AudienceMismatch);
        assert_eq!(
            AuthError::from(Error::from(ErrorKind::ImmatureSignature)),
            AuthError::TokenNotYetValid
        );
    }

    #[test]
    fn test_missing_claims_map_by_name() {
        let missing = |name: &str| AuthError::from(Error::from(ErrorKind::MissingRequiredClaim(name.to_string())));
        assert_eq!(missing("iss"), AuthError::IssuerMismatch);
        assert_eq!(missing("aud"), AuthError::AudienceMismatch);
        assert_eq!(missing("exp"), AuthError::MissingClaim("exp".to_string()));
    }

    #[test]
    fn test_algorithm_confusion_is_a_signature_failure() {
        assert!(matches!(
            AuthError::from(Error::from(ErrorKind::InvalidAlgorithm)),
            AuthError::InvalidSignature(_)
        ));
        assert!(matches!(
            AuthError::from(Error::from(ErrorKind::InvalidSignature)),
            AuthError::InvalidSignature(_)
        ));
    }

    #[test]
    fn test_upstream_classification() {
        assert!(AuthError::DiscoveryUnavailable("timeout".into()).is_upstream_unavailable());
        assert!(AuthError::JwksUnavailable("HTTP 503".into()).is_upstream_unavailable());
        assert!(!AuthError::TokenExpired.is_upstream_unavailable());
        assert!(!AuthError::InvalidDiscoveryDocument("no jwks_uri".into()).is_upstream_unavailable());
    }
}
