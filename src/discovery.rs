// src/discovery.rs

use crate::error::AuthError;
use crate::model::{DiscoveryDocument, RawDiscoveryDocument};
use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};
use url::Url;

/// A discovery document together with the time it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub document: Arc<DiscoveryDocument>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    /// The issuer subsequent tokens must carry, taken from the document that
    /// produced this entry.
    pub fn expected_issuer(&self) -> Option<&str> {
        self.document.issuer.as_deref()
    }
}

/// Fetches the provider's discovery document and serves it for at most `ttl`.
///
/// The document is replaced as a whole. An expired entry is never served: a
/// failed refresh after expiry surfaces to the caller instead of falling back
/// to the previous document. Concurrent callers that miss at the same time
/// share one fetch.
#[derive(Clone)]
pub struct DiscoveryCache {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    discovery_url: Url,
    allow_http: bool,
    entries: Cache<Url, CacheEntry>,
}

impl DiscoveryCache {
    pub fn new(http_client: reqwest::Client, discovery_url: Url, ttl: Duration, allow_http: bool) -> Self {
        let entries = Cache::builder().max_capacity(1).time_to_live(ttl).build();
        Self {
            inner: Arc::new(Inner {
                http_client,
                discovery_url,
                allow_http,
                entries,
            }),
        }
    }

    /// Returns the current discovery document, fetching it if there is no
    /// fresh entry.
    pub async fn get(&self) -> Result<Arc<DiscoveryDocument>, AuthError> {
        self.entry().await.map(|entry| entry.document)
    }

    /// Like [`get`](Self::get), but returns the whole cache entry.
    pub async fn entry(&self) -> Result<CacheEntry, AuthError> {
        let url = &self.inner.discovery_url;
        if let Some(entry) = self.inner.entries.get(url).await {
            debug!(age = ?entry.age(), "Discovery cache hit");
            return Ok(entry);
        }

        debug!("Discovery cache miss. Fetching from provider.");
        self.inner
            .entries
            .try_get_with_by_ref(url, self.fetch())
            .await
            .map_err(|e| (*e).clone())
    }

    /// Drops the cached document so the next call refetches it.
    pub async fn invalidate(&self) {
        self.inner.entries.invalidate(&self.inner.discovery_url).await;
    }

    #[instrument(skip(self), fields(url = %self.inner.discovery_url), err)]
    async fn fetch(&self) -> Result<CacheEntry, AuthError> {
        let response = self
            .inner
            .http_client
            .get(self.inner.discovery_url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch discovery document");
                AuthError::DiscoveryUnavailable(describe(&e))
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "Discovery endpoint returned error");
            return Err(AuthError::DiscoveryUnavailable(format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(error = %e, "Failed to read discovery document");
            AuthError::DiscoveryUnavailable(describe(&e))
        })?;
        let raw: RawDiscoveryDocument = serde_json::from_slice(&body)
            .map_err(|e| AuthError::InvalidDiscoveryDocument(e.to_string()))?;
        let document = DiscoveryDocument::from_raw(raw, self.inner.allow_http)?;

        info!(
            issuer = document.issuer.as_deref().unwrap_or("<none>"),
            jwks_uri = %document.jwks_uri,
            algorithms = ?document.signing_algorithms,
            "Fetched discovery document"
        );

        Ok(CacheEntry {
            document: Arc::new(document),
            fetched_at: Instant::now(),
        })
    }
}

/// Short description of a transport error.
pub(crate) fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(body: serde_json::Value) -> (MockServer, DiscoveryCache) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let url = Url::parse(&format!("{}/.well-known/openid-configuration", server.uri())).unwrap();
        let cache = DiscoveryCache::new(reqwest::Client::new(), url, Duration::from_secs(60), false);
        (server, cache)
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (server, cache) = provider(json!({
            "issuer": "https://id.example.com",
            "jwks_uri": "https://id.example.com/certs",
            "id_token_signing_alg_values_supported": ["RS256"],
        }))
        .await;

        let entry = cache.entry().await.unwrap();
        assert_eq!(entry.expected_issuer(), Some("https://id.example.com"));
        assert!(entry.document.advertises("RS256"));
        cache.get().await.unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        cache.invalidate().await;
        cache.get().await.unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insecure_jwks_uri_is_rejected() {
        let (_server, cache) = provider(json!({
            "issuer": "https://id.example.com",
            "jwks_uri": "http://id.example.com/certs",
            "id_token_signing_alg_values_supported": ["RS256"],
        }))
        .await;

        assert!(matches!(cache.get().await, Err(AuthError::InvalidDiscoveryDocument(_))));
    }
}
