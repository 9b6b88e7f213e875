// src/config.rs

use crate::error::AuthError;
use crate::model::is_secure_url;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use url::Url;

/// Default timeout for every request to the identity provider.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Default lifetime of a cached discovery document.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on the discovery cache TTL.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// The configuration for the token validator.
///
/// Immutable once built. The discovery URL and timeout never change for the
/// lifetime of a validator; only the cached document and the key set are
/// refreshed. Construct it with [`ConfigBuilder`] or [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// The provider's `.well-known/openid-configuration` URL.
    pub discovery_url: Url,
    /// When set, tokens must list this value in their `aud` claim.
    /// When unset, the audience is not checked at all; restricting it is
    /// the deployer's responsibility.
    pub audience: Option<String>,
    /// Timeout applied to each discovery and JWKS request.
    pub http_timeout: Duration,
    /// How long a fetched discovery document is served before refetching.
    pub cache_ttl: Duration,
    /// The tolerance for clock skew when validating `exp` and `nbf`.
    /// Defaults to zero.
    pub leeway: Duration,
    /// Permit plain `http` URLs for non-loopback hosts.
    pub allow_http: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a map of variables.
    ///
    /// Recognised variables: `OIDC_DISCOVERY_URL` (required), `OIDC_AUDIENCE`,
    /// `OIDC_HTTP_TIMEOUT_SECONDS`, `OIDC_CACHE_TTL_SECONDS`,
    /// `OIDC_LEEWAY_SECONDS` and `OIDC_ALLOW_HTTP`.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, AuthError> {
        let mut builder = ConfigBuilder::new();

        if let Some(allow_http) = vars.get("OIDC_ALLOW_HTTP") {
            let allow_http = match allow_http.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                other => {
                    return Err(AuthError::InvalidConfiguration(format!(
                        "OIDC_ALLOW_HTTP must be 'true' or 'false', got '{}'",
                        other
                    )))
                }
            };
            builder = builder.allow_http(allow_http);
        }

        let discovery_url = vars
            .get("OIDC_DISCOVERY_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AuthError::MissingConfiguration("OIDC_DISCOVERY_URL".to_string()))?;
        builder = builder.discovery_url(discovery_url.trim())?;

        if let Some(audience) = vars.get("OIDC_AUDIENCE").map(|aud| aud.trim()) {
            if !audience.is_empty() {
                builder = builder.audience(audience.to_string());
            }
        }
        if let Some(secs) = parse_seconds(vars, "OIDC_HTTP_TIMEOUT_SECONDS")? {
            builder = builder.http_timeout(secs);
        }
        if let Some(secs) = parse_seconds(vars, "OIDC_CACHE_TTL_SECONDS")? {
            builder = builder.cache_ttl(secs);
        }
        if let Some(secs) = parse_seconds(vars, "OIDC_LEEWAY_SECONDS")? {
            builder = builder.leeway(secs);
        }

        builder.build()
    }
}

fn parse_seconds(vars: &HashMap<String, String>, name: &str) -> Result<Option<Duration>, AuthError> {
    vars.get(name)
        .map(|value| {
            value.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                AuthError::InvalidConfiguration(format!(
                    "{} must be a non-negative integer number of seconds, got '{}': {}",
                    name, value, e
                ))
            })
        })
        .transpose()
}

/// A builder for creating a `Config` instance.
///
/// This builder provides a fluent API to ensure that the configuration is
/// constructed correctly and with all required fields.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    discovery_url: Option<Url>,
    audience: Option<String>,
    http_timeout: Option<Duration>,
    cache_ttl: Option<Duration>,
    leeway: Option<Duration>,
    allow_http: bool,
}

impl ConfigBuilder {
    /// Creates a new `ConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the discovery URL of the OIDC provider. This is a required field.
    ///
    /// # Arguments
    ///
    /// * `url` - e.g. "https://id.example.com/realms/symbiosis/.well-known/openid-configuration".
    pub fn discovery_url(mut self, url: &str) -> Result<Self, AuthError> {
        let parsed_url = Url::parse(url).map_err(|e| AuthError::InvalidUrl(e.to_string()))?;
        self.discovery_url = Some(parsed_url);
        Ok(self)
    }

    /// Requires tokens to carry this audience. This is optional.
    pub fn audience(mut self, audience: String) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Sets the per-request timeout for the identity provider.
    /// Defaults to 3 seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Sets how long the discovery document is cached.
    /// Defaults to one hour.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Sets the clock skew tolerance. Defaults to zero.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = Some(leeway);
        self
    }

    /// Allows plain `http` endpoints on non-loopback hosts.
    pub fn allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Consumes the builder and returns a `Config` object.
    ///
    /// # Errors
    ///
    /// Returns an error if `discovery_url` is missing or not https, or if the
    /// timeout or cache TTL is zero.
    pub fn build(self) -> Result<Config, AuthError> {
        let discovery_url = self
            .discovery_url
            .ok_or_else(|| AuthError::MissingConfiguration("discovery_url".to_string()))?;
        if !self.allow_http && !is_secure_url(&discovery_url) {
            return Err(AuthError::InvalidConfiguration(format!(
                "discovery_url must use https: {}",
                discovery_url
            )));
        }

        let http_timeout = self.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);
        if http_timeout.is_zero() {
            return Err(AuthError::InvalidConfiguration(
                "http_timeout must be greater than zero".to_string(),
            ));
        }

        let cache_ttl = self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL);
        if cache_ttl.is_zero() || cache_ttl > MAX_CACHE_TTL {
            return Err(AuthError::InvalidConfiguration(format!(
                "cache_ttl must be between 1 second and {} seconds",
                MAX_CACHE_TTL.as_secs()
            )));
        }

        Ok(Config {
            discovery_url,
            audience: self.audience,
            http_timeout,
            cache_ttl,
            leeway: self.leeway.unwrap_or(Duration::ZERO),
            allow_http: self.allow_http,
        })
    }
}
