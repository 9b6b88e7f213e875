// src/client.rs

use crate::discovery::describe;
use crate::error::AuthError;
use crate::model::{JsonWebKey, JsonWebKeySet};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// A public key usable for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    /// The algorithm the key is bound to, when the JWK declares one.
    pub alg: Option<Algorithm>,
    pub(crate) decoding_key: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Converts a JWK into a signing key.
    ///
    /// Returns `Ok(None)` for keys that are not meant for signature
    /// verification or use an unsupported key type.
    pub fn from_jwk(jwk: &JsonWebKey) -> Result<Option<Self>, AuthError> {
        let Some(kid) = jwk.kid.clone() else {
            return Ok(None);
        };
        if jwk.use_purpose.as_deref().is_some_and(|purpose| purpose != "sig") {
            return Ok(None);
        }

        let missing = |field: &str| AuthError::InvalidKeySet(format!("{} key '{}' missing '{}'", jwk.kty, kid, field));
        let decoding_key = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
                let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
                DecodingKey::from_rsa_components(n, e)
            }
            "EC" => {
                let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
                let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
                DecodingKey::from_ec_components(x, y)
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Ok(None);
                }
                let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
                DecodingKey::from_ed_components(x)
            }
            _ => return Ok(None),
        }
        .map_err(|e| AuthError::InvalidKeySet(format!("key '{}': {}", kid, e)))?;

        let alg = match jwk.alg.as_deref() {
            Some(alg) => Some(
                Algorithm::from_str(alg)
                    .map_err(|_| AuthError::InvalidKeySet(format!("key '{}' has unsupported alg '{}'", kid, alg)))?,
            ),
            None => None,
        };

        Ok(Some(Self { kid, alg, decoding_key }))
    }
}

/// The public keys published at one JWKS URI, indexed by key ID.
///
/// Never merged: a new fetch builds a new set that replaces the old one.
#[derive(Debug)]
pub struct SigningKeySet {
    pub jwks_uri: Url,
    pub fetched_at: Instant,
    keys: HashMap<String, Arc<SigningKey>>,
}

impl SigningKeySet {
    /// Builds a key set, skipping entries that cannot be used.
    pub fn from_jwks(jwks_uri: Url, jwks: JsonWebKeySet) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());

        for value in jwks.keys {
            let jwk: JsonWebKey = match serde_json::from_value(value) {
                Ok(jwk) => jwk,
                Err(e) => {
                    warn!(error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };
            match SigningKey::from_jwk(&jwk) {
                Ok(Some(key)) => {
                    if keys.contains_key(&key.kid) {
                        warn!(kid = %key.kid, "Duplicate kid in JWKS, keeping the first key");
                        continue;
                    }
                    keys.insert(key.kid.clone(), Arc::new(key));
                }
                Ok(None) => debug!(kid = ?jwk.kid, kty = %jwk.kty, "Skipping JWK not usable for signature verification"),
                Err(e) => warn!(error = %e, "Skipping invalid JWK"),
            }
        }

        Self {
            jwks_uri,
            fetched_at: Instant::now(),
            keys,
        }
    }

    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

/// A client for fetching and holding the provider's JSON Web Key Set.
///
/// The key set is fetched lazily on first use and rebuilt when the JWKS URI
/// changes or when [`refresh`](Self::refresh) is called.
#[derive(Clone)]
pub struct JwksClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    key_set: RwLock<Option<Arc<SigningKeySet>>>,
}

impl JwksClient {
    /// Creates a new `JwksClient`. No request is made until a key is needed.
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                http_client,
                key_set: RwLock::new(None),
            }),
        }
    }

    /// Retrieves the signing key for the given Key ID (`kid`).
    ///
    /// Uses the current key set if it was built from `jwks_uri`; otherwise
    /// fetches and builds a new one first.
    #[instrument(skip(self, jwks_uri), err)]
    pub async fn resolve_key(&self, jwks_uri: &Url, kid: Option<&str>) -> Result<Arc<SigningKey>, AuthError> {
        let kid = kid.ok_or(AuthError::MissingKeyId)?;
        let key_set = self.key_set(jwks_uri).await?;

        match key_set.get(kid) {
            Some(key) => {
                debug!("JWK cache hit for kid: {}", kid);
                Ok(key)
            }
            None => {
                debug!("Key not found in JWKS for kid: {}", kid);
                Err(AuthError::UnknownSigningKey(kid.to_string()))
            }
        }
    }

    /// Returns the key set for `jwks_uri`, building it if none exists yet or
    /// the current one came from a different URI.
    pub async fn key_set(&self, jwks_uri: &Url) -> Result<Arc<SigningKeySet>, AuthError> {
        {
            let current = self.inner.key_set.read().await;
            if let Some(key_set) = current.as_ref().filter(|set| &set.jwks_uri == jwks_uri) {
                return Ok(key_set.clone());
            }
        }

        debug!(%jwks_uri, "No key set for JWKS URI. Fetching from provider.");
        self.refresh(jwks_uri).await
    }

    /// Fetches the JWKS and replaces the current key set with the result.
    ///
    /// On failure the current key set is left untouched.
    #[instrument(skip(self), fields(jwks_uri = %jwks_uri), err)]
    pub async fn refresh(&self, jwks_uri: &Url) -> Result<Arc<SigningKeySet>, AuthError> {
        if let Some(previous) = self.inner.key_set.read().await.as_ref() {
            debug!(age = ?previous.fetched_at.elapsed(), "Replacing key set");
        }

        let jwks = self.fetch_jwks(jwks_uri).await?;
        let key_set = Arc::new(SigningKeySet::from_jwks(jwks_uri.clone(), jwks));

        if key_set.is_empty() {
            warn!("JWKS contains no usable signing keys");
        } else {
            info!("Successfully fetched {} signing keys", key_set.len());
        }

        *self.inner.key_set.write().await = Some(key_set.clone());
        Ok(key_set)
    }

    async fn fetch_jwks(&self, jwks_uri: &Url) -> Result<JsonWebKeySet, AuthError> {
        let response = self
            .inner
            .http_client
            .get(jwks_uri.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch JWKS");
                AuthError::JwksUnavailable(describe(&e))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "JWKS endpoint returned error");
            return Err(AuthError::JwksUnavailable(format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(error = %e, "Failed to read JWKS response");
            AuthError::JwksUnavailable(describe(&e))
        })?;
        serde_json::from_slice(&body).map_err(|e| AuthError::InvalidKeySet(e.to_string()))
    }
}
