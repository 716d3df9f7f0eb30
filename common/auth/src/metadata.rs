//! OpenID metadata retrieval and the process-owned cache of metadata sources.
//!
//! A [`MetadataCache`] maps a metadata URL to one [`OpenIdMetadataSource`]. The
//! host creates the cache, hands clones to the verifier and calls
//! [`MetadataCache::shutdown`] when it stops serving.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex as RefreshLock;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::jwks::{JwksFetcher, SigningKey};
use crate::verifier::InMemoryKeyStore;

/// Keys older than this are reloaded before use.
pub const AUTOMATIC_REFRESH_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);
/// Minimum spacing between two fetches of the same metadata document.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
struct OpenIdDocument {
    jwks_uri: String,
    #[serde(default)]
    issuer: Option<String>,
}

#[derive(Debug, Default)]
struct RefreshState {
    loaded_at: Option<Instant>,
    attempted_at: Option<Instant>,
    last_error: Option<AuthError>,
}

/// Signing keys published behind one OpenID metadata document.
pub struct OpenIdMetadataSource {
    url: String,
    client: Client,
    store: InMemoryKeyStore,
    state: Mutex<RefreshState>,
    refresh_lock: RefreshLock<()>,
    automatic_refresh: Duration,
    refresh_interval: Duration,
}

impl OpenIdMetadataSource {
    fn new(
        url: String,
        client: Client,
        automatic_refresh: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            url,
            client,
            store: InMemoryKeyStore::new(),
            state: Mutex::new(RefreshState::default()),
            refresh_lock: RefreshLock::new(()),
            automatic_refresh,
            refresh_interval,
        }
    }

    pub fn store(&self) -> &InMemoryKeyStore {
        &self.store
    }

    fn is_stale(&self, now: Instant) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.loaded_at {
            Some(loaded) => now.duration_since(loaded) >= self.automatic_refresh,
            None => true,
        }
    }

    /// Outcome of the last fetch when it started less than `refresh_interval`
    /// ago, `None` when another fetch is allowed.
    fn recent_attempt(&self, now: Instant) -> Option<AuthResult<()>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let attempted = state.attempted_at?;
        if now.duration_since(attempted) >= self.refresh_interval {
            return None;
        }
        Some(match &state.last_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        })
    }

    /// Returns the key for `kid`, loading or refreshing the JWKS as needed.
    pub async fn signing_key(&self, kid: &str) -> AuthResult<SigningKey> {
        if self.is_stale(Instant::now()) {
            if let Err(err) = self.refresh_if_due().await {
                if self.store.is_empty() {
                    return Err(err);
                }
                warn!(error = %err, metadata_url = %self.url, "Using stale signing keys");
            }
        }

        if let Some(key) = self.store.get(kid) {
            return Ok(key);
        }

        debug!(kid, metadata_url = %self.url, "Unknown kid, refreshing signing keys");
        self.refresh_if_due().await?;
        self.store
            .get(kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.to_string()))
    }

    /// Fetches at most once per `refresh_interval`. Callers arriving while a
    /// fetch is in flight wait for it and share its outcome.
    async fn refresh_if_due(&self) -> AuthResult<()> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(outcome) = self.recent_attempt(Instant::now()) {
            return outcome;
        }
        self.load().await.map(|_| ())
    }

    async fn load(&self) -> AuthResult<usize> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.attempted_at = Some(Instant::now());
        }

        let outcome = self.fetch_keys().await;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok((count, issuer)) => {
                state.loaded_at = Some(Instant::now());
                state.last_error = None;
                info!(
                    count,
                    metadata_url = %self.url,
                    issuer = issuer.as_deref().unwrap_or("-"),
                    "Loaded signing keys"
                );
                Ok(count)
            }
            Err(err) => {
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn fetch_keys(&self) -> AuthResult<(usize, Option<String>)> {
        let document = self.fetch_document().await?;
        let fetcher = JwksFetcher::with_client(self.client.clone(), document.jwks_uri);
        let keys = fetcher.fetch().await?;
        let count = keys.len();
        if count > 0 {
            self.store.replace_all(keys);
        }
        Ok((count, document.issuer))
    }

    async fn fetch_document(&self) -> AuthResult<OpenIdDocument> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::MetadataFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::MetadataFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        response
            .json()
            .await
            .map_err(|err| AuthError::MetadataDecode(err.to_string()))
    }
}

/// Thread-safe map from metadata URL to its shared source.
#[derive(Clone)]
pub struct MetadataCache {
    client: Client,
    sources: Arc<RwLock<HashMap<String, Arc<OpenIdMetadataSource>>>>,
    automatic_refresh: Duration,
    refresh_interval: Duration,
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            sources: Arc::new(RwLock::new(HashMap::new())),
            automatic_refresh: AUTOMATIC_REFRESH_INTERVAL,
            refresh_interval: REFRESH_INTERVAL,
        }
    }

    pub fn with_refresh_intervals(mut self, automatic: Duration, on_unknown_kid: Duration) -> Self {
        self.automatic_refresh = automatic;
        self.refresh_interval = on_unknown_kid;
        self
    }

    /// Source for `url`, created on first use and shared afterwards.
    pub fn source(&self, url: &str) -> Arc<OpenIdMetadataSource> {
        {
            let guard = self.sources.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(source) = guard.get(url) {
                return source.clone();
            }
        }

        let mut guard = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(url.to_string())
            .or_insert_with(|| {
                debug!(metadata_url = url, "Registering OpenID metadata source");
                Arc::new(OpenIdMetadataSource::new(
                    url.to_string(),
                    self.client.clone(),
                    self.automatic_refresh,
                    self.refresh_interval,
                ))
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every source. Lookups after shutdown start from an empty cache.
    pub fn shutdown(&self) {
        let mut guard = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let released = guard.len();
        guard.clear();
        info!(released, "Metadata cache shut down");
    }
}
