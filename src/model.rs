// src/model.rs

use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use url::Url;

/// The wire shape of an OIDC provider's discovery document.
/// Found at the `.well-known/openid-configuration` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDiscoveryDocument {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
}

/// The subset of the discovery document the validator relies on.
///
/// Immutable once fetched. A refresh replaces the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryDocument {
    /// The provider's issuer identifier. When absent, the `iss` claim is not checked.
    pub issuer: Option<String>,
    /// Where the provider publishes its signing keys.
    pub jwks_uri: Url,
    /// Algorithms the provider advertises for signing tokens.
    pub signing_algorithms: BTreeSet<String>,
}

impl DiscoveryDocument {
    /// Builds a document from its wire form, rejecting documents that cannot be used.
    pub(crate) fn from_raw(raw: RawDiscoveryDocument, allow_http: bool) -> Result<Self, AuthError> {
        let jwks_uri = raw
            .jwks_uri
            .filter(|uri| !uri.trim().is_empty())
            .ok_or_else(|| AuthError::InvalidDiscoveryDocument("missing 'jwks_uri'".to_string()))?;
        let jwks_uri = Url::parse(&jwks_uri)
            .map_err(|e| AuthError::InvalidDiscoveryDocument(format!("invalid 'jwks_uri': {}", e)))?;
        if !allow_http && !is_secure_url(&jwks_uri) {
            return Err(AuthError::InvalidDiscoveryDocument(
                "'jwks_uri' must use https".to_string(),
            ));
        }

        Ok(Self {
            issuer: raw.issuer.filter(|iss| !iss.is_empty()),
            jwks_uri,
            signing_algorithms: raw
                .id_token_signing_alg_values_supported
                .unwrap_or_default()
                .into_iter()
                .collect(),
        })
    }

    /// Whether the provider advertises the given algorithm name.
    pub fn advertises(&self, alg: &str) -> bool {
        self.signing_algorithms.contains(alg)
    }
}

/// Returns true for `https` URLs and for plain `http` on a loopback host.
pub(crate) fn is_secure_url(url: &Url) -> bool {
    let is_loopback = matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("::1")
    );
    url.scheme() == "https" || (url.scheme() == "http" && is_loopback)
}

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(rename = "use", default)]
    pub use_purpose: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    // RSA
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
    // EC / OKP
    #[serde(default)]
    pub crv: Option<String>,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
///
/// Entries are kept as raw JSON so a single unrecognisable key does not
/// invalidate the rest of the set.
#[derive(Debug, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<Value>,
}

/// The verified claims of a token.
///
/// Claims are provider-defined, so the full payload is kept as a JSON
/// object. Nothing is dropped or renamed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    /// Returns the value of a claim, if present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a claim as a string, if present and a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// The `iss` claim.
    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    /// The `exp` claim, in seconds since the epoch.
    pub fn expires_at(&self) -> Option<u64> {
        self.0.get("exp").and_then(Value::as_u64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ClaimSet {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawDiscoveryDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_discovery_document_from_raw() {
        let doc = DiscoveryDocument::from_raw(
            raw(json!({
                "issuer": "https://id.example.com/realms/symbiosis",
                "jwks_uri": "https://id.example.com/realms/symbiosis/certs",
                "id_token_signing_alg_values_supported": ["RS256", "ES256"],
                "token_endpoint": "https://id.example.com/token"
            })),
            false,
        )
        .unwrap();

        assert_eq!(doc.issuer.as_deref(), Some("https://id.example.com/realms/symbiosis"));
        assert_eq!(doc.jwks_uri.as_str(), "https://id.example.com/realms/symbiosis/certs");
        assert!(doc.advertises("RS256"));
        assert!(doc.advertises("ES256"));
        assert!(!doc.advertises("HS256"));
    }

    #[test]
    fn test_discovery_document_requires_jwks_uri() {
        let result = DiscoveryDocument::from_raw(raw(json!({ "issuer": "https://id.example.com" })), false);
        assert!(matches!(result, Err(AuthError::InvalidDiscoveryDocument(_))));

        let result = DiscoveryDocument::from_raw(
            raw(json!({ "issuer": "https://id.example.com", "jwks_uri": "" })),
            false,
        );
        assert!(matches!(result, Err(AuthError::InvalidDiscoveryDocument(_))));
    }

    #[test]
    fn test_discovery_document_rejects_plain_http_jwks_uri() {
        let doc = raw(json!({ "jwks_uri": "http://id.example.com/certs" }));
        assert!(matches!(
            DiscoveryDocument::from_raw(doc, false),
            Err(AuthError::InvalidDiscoveryDocument(_))
        ));

        let doc = raw(json!({ "jwks_uri": "http://id.example.com/certs" }));
        assert!(DiscoveryDocument::from_raw(doc, true).is_ok());

        let doc = raw(json!({ "jwks_uri": "http://127.0.0.1:8080/certs" }));
        assert!(DiscoveryDocument::from_raw(doc, false).is_ok());
    }

    #[test]
    fn test_missing_algorithms_and_issuer_default_to_empty() {
        let doc = DiscoveryDocument::from_raw(raw(json!({ "jwks_uri": "https://id.example.com/certs" })), false)
            .unwrap();
        assert!(doc.issuer.is_none());
        assert!(doc.signing_algorithms.is_empty());
    }

    #[test]
    fn test_claim_set_keeps_every_claim() {
        let claims: ClaimSet = serde_json::from_value(json!({
            "iss": "https://id.example.com",
            "sub": "user-1",
            "exp": 1_900_000_000u64,
            "realm_access": { "roles": ["admin"] },
            "email_verified": true
        }))
        .unwrap();

        assert_eq!(claims.len(), 5);
        assert_eq!(claims.subject(), Some("user-1"));
        assert_eq!(claims.issuer(), Some("https://id.example.com"));
        assert_eq!(claims.expires_at(), Some(1_900_000_000));
        assert_eq!(claims.get("realm_access"), Some(&json!({ "roles": ["admin"] })));
        assert_eq!(claims.get("email_verified"), Some(&json!(true)));
    }
}
