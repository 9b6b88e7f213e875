// src/validator.rs

use crate::bearer::{extract_bearer_token, AuthenticatedUser};
use crate::client::{JwksClient, SigningKey};
use crate::config::Config;
use crate::discovery::DiscoveryCache;
use crate::error::AuthError;
use crate::model::{ClaimSet, DiscoveryDocument};
use crate::token::UnverifiedToken;
use jsonwebtoken::{decode, Algorithm, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

/// The OIDC bearer token validator.
///
/// This struct is initialized with a `Config` and should be created once
/// and reused for all validation requests. It owns the discovery cache and
/// the JWKS key set; clones share both.
#[derive(Clone)]
pub struct Validator {
    config: Arc<Config>,
    discovery: DiscoveryCache,
    jwks_client: JwksClient,
}

impl Validator {
    /// Creates a new `Validator` with the given configuration.
    ///
    /// No request is made to the identity provider until the first token is
    /// validated.
    pub fn new(config: Config) -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("symbiosis-auth/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::HttpClient(e.to_string()))?;

        let discovery = DiscoveryCache::new(
            http_client.clone(),
            config.discovery_url.clone(),
            config.cache_ttl,
            config.allow_http,
        );
        let jwks_client = JwksClient::new(http_client);

        Ok(Self {
            config: Arc::new(config),
            discovery,
            jwks_client,
        })
    }

    /// Creates a validator from the `OIDC_*` environment variables.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::new(Config::from_env()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the current discovery document, refreshing it if it expired.
    pub async fn discovery_document(&self) -> Result<Arc<DiscoveryDocument>, AuthError> {
        self.discovery.get().await
    }

    /// Validates a bearer token.
    ///
    /// This method performs, in order:
    /// 1. A structural check of the token.
    /// 2. Retrieval of the (cached) discovery document.
    /// 3. Resolution of the signing key from the JWKS. An unknown `kid`
    ///    forces one key set refresh and one retry.
    /// 4. Signature verification, with the algorithm constrained to those the
    ///    provider advertises.
    /// 5. Validation of `exp`, `nbf`, `iss` (against the discovered issuer) and
    ///    `aud` (when an audience is configured).
    ///
    /// # Returns
    ///
    /// The full claim set of the token if validation is successful.
    #[instrument(skip_all, err)]
    pub async fn validate(&self, token: &str) -> Result<ClaimSet, AuthError> {
        // 1. Structural check, before any network access.
        let unverified = UnverifiedToken::parse(token)?;

        // 2. Discovery document.
        let document = self.discovery.get().await?;

        // 3. Signing key.
        let key = match self
            .jwks_client
            .resolve_key(&document.jwks_uri, unverified.key_id())
            .await
        {
            Err(AuthError::UnknownSigningKey(kid)) => {
                warn!(kid = %kid, "Signing key not found. Refreshing key set once.");
                self.jwks_client.refresh(&document.jwks_uri).await?;
                self.jwks_client
                    .resolve_key(&document.jwks_uri, unverified.key_id())
                    .await?
            }
            result => result?,
        };

        // 4. Algorithm constraint.
        let algorithm = select_algorithm(unverified.algorithm(), &document, &key)?;

        // 5. Signature and claims.
        let validation = self.build_validation(algorithm, &document);
        let token_data = decode::<ClaimSet>(token, &key.decoding_key, &validation)?;
        self.check_expiry(&token_data.claims)?;

        debug!(kid = %key.kid, alg = ?algorithm, "Token validated");
        Ok(token_data.claims)
    }

    /// Extracts the bearer token from an `Authorization` header value and
    /// validates it.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthenticatedUser, AuthError> {
        let header = authorization.ok_or(AuthError::MissingBearerToken)?;
        let token = extract_bearer_token(header)?;
        let claims = self.validate(token).await?;
        Ok(AuthenticatedUser { claims })
    }

    /// `jsonwebtoken` accepts `exp == now`; the token must expire strictly
    /// after the current second (minus leeway).
    fn check_expiry(&self, claims: &ClaimSet) -> Result<(), AuthError> {
        let Some(exp) = claims.expires_at() else {
            return Ok(());
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        if exp <= now.saturating_sub(self.config.leeway.as_secs()) {
            return Err(AuthError::TokenExpired);
        }
        Ok(())
    }

    fn build_validation(&self, algorithm: Algorithm, document: &DiscoveryDocument) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.config.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let mut required_claims = vec!["exp"];

        if let Some(issuer) = &document.issuer {
            validation.set_issuer(&[issuer]);
            required_claims.push("iss");
        }

        // Without a configured audience the check is skipped entirely.
        // Otherwise the library rejects any token that carries an `aud`.
        match &self.config.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required_claims.push("aud");
            }
            None => validation.validate_aud = false,
        }

        validation.set_required_spec_claims(&required_claims);
        validation
    }
}

/// Picks the verification algorithm.
///
/// The token's `alg` is only accepted if the provider advertises it, the
/// crate can verify it, and it agrees with the key's own `alg`.
fn select_algorithm(alg: &str, document: &DiscoveryDocument, key: &SigningKey) -> Result<Algorithm, AuthError> {
    if !document.advertises(alg) {
        return Err(AuthError::InvalidSignature(format!(
            "algorithm '{}' is not advertised by the provider",
            alg
        )));
    }

    let algorithm = Algorithm::from_str(alg)
        .map_err(|_| AuthError::InvalidSignature(format!("algorithm '{}' is not supported", alg)))?;

    if let Some(key_alg) = key.alg {
        if key_alg != algorithm {
            return Err(AuthError::InvalidSignature(format!(
                "key '{}' is bound to {:?}, token uses {:?}",
                key.kid, key_alg, algorithm
            )));
        }
    }

    Ok(algorithm)
}
