//! Signing key acquisition and caching.
//!
//! # Cache behavior
//!
//! - The cache starts empty and is filled lazily on the first lookup miss
//!   (or eagerly via [`JwksKeySource::warm`]).
//! - A miss for an unknown `kid` triggers a refresh, then the lookup is retried
//!   once against the new snapshot. Refreshes triggered by misses are spaced by
//!   `min_refresh_interval` so bogus key IDs cannot drive load to the endpoint.
//! - Concurrent refreshes coalesce: one fetch runs in a spawned task and every
//!   waiter observes its result. A cancelled waiter does not cancel the fetch.
//! - Readers clone an `Arc<KeySet>` under a read lock; a refresh swaps the whole
//!   snapshot under a write lock. No lock is held across the network call.
//! - A failed fetch starts a cooldown of `min_refresh_interval` during which
//!   misses fail fast with [`KeyError::DiscoveryUnavailable`].
//! - Once `cache_ttl` elapses a hit triggers a refresh; if that refresh fails
//!   the stale key is still served. If it succeeds without the key, the key
//!   has been rotated out and the lookup is [`KeyError::NotFound`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse},
};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::KeysConfig;

/// Key lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The key set was fetched but does not contain this `kid`.
    #[error("Signing key not found: {0}")]
    NotFound(String),

    /// The key-discovery endpoint could not be reached or returned garbage.
    #[error("Key discovery unavailable: {0}")]
    DiscoveryUnavailable(String),
}

/// A public key that can verify token signatures.
#[derive(Clone)]
pub struct SigningKey {
    /// Key identifier (`kid`)
    pub kid: String,
    /// Algorithm the key is published for
    pub algorithm: Algorithm,
    key: DecodingKey,
}

impl SigningKey {
    /// Build a signing key from a published JWK.
    ///
    /// Returns `None` for keys without a `kid`, keys marked for encryption,
    /// and keys whose material cannot be loaded.
    #[must_use]
    pub fn from_jwk(jwk: &Jwk) -> Option<Self> {
        let kid = jwk.common.key_id.clone()?;

        if matches!(
            jwk.common.public_key_use,
            Some(PublicKeyUse::Encryption | PublicKeyUse::Other(_))
        ) {
            debug!(kid = %kid, "Skipping non-signature JWK");
            return None;
        }

        let algorithm = jwk_algorithm(jwk)?;
        match DecodingKey::from_jwk(jwk) {
            Ok(key) => Some(Self {
                kid,
                algorithm,
                key,
            }),
            Err(e) => {
                debug!(kid = %kid, error = %e, "Skipping JWK (cannot create DecodingKey)");
                None
            }
        }
    }

    /// Key material for `jsonwebtoken::decode`.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    match jwk.common.key_algorithm {
        Some(KeyAlgorithm::RS256) => Some(Algorithm::RS256),
        Some(KeyAlgorithm::RS384) => Some(Algorithm::RS384),
        Some(KeyAlgorithm::RS512) => Some(Algorithm::RS512),
        Some(KeyAlgorithm::PS256) => Some(Algorithm::PS256),
        Some(KeyAlgorithm::ES256) => Some(Algorithm::ES256),
        Some(KeyAlgorithm::ES384) => Some(Algorithm::ES384),
        Some(_) => None,
        // Providers often omit `alg`; infer from the key type.
        None => match jwk.algorithm {
            AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
            AlgorithmParameters::EllipticCurve(_) => Some(Algorithm::ES256),
            AlgorithmParameters::OctetKey(_) | AlgorithmParameters::OctetKeyPair(_) => None,
        },
    }
}

/// The published key-discovery document.
///
/// Keys stay as raw JSON so one unsupported entry does not poison the set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyDocument {
    /// Published keys
    #[serde(default)]
    pub keys: Vec<serde_json::Value>,
}

/// Immutable snapshot of the usable signing keys.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    fetched_at: Option<Instant>,
}

impl KeySet {
    /// Build a snapshot from a fetched document, stamped with the current time.
    #[must_use]
    pub fn from_document(document: &KeyDocument) -> Self {
        let mut keys = HashMap::new();
        for raw in &document.keys {
            let jwk = match serde_json::from_value::<Jwk>(raw.clone()) {
                Ok(jwk) => jwk,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };
            if let Some(key) = SigningKey::from_jwk(&jwk) {
                keys.insert(key.kid.clone(), Arc::new(key));
            }
        }

        Self {
            keys,
            fetched_at: Some(Instant::now()),
        }
    }

    /// Look up a key by identifier.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<Arc<SigningKey>> {
        self.keys.get(kid).cloned()
    }

    /// Number of usable keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.is_none_or(|at| at.elapsed() >= ttl)
    }

    fn refreshed_within(&self, interval: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() < interval)
    }
}

/// Fetches the raw key-discovery document.
#[async_trait]
pub trait JwksFetcher: Send + Sync + 'static {
    /// Fetch the current document.
    async fn fetch(&self) -> Result<KeyDocument, KeyError>;
}

/// Resolves signing keys by identifier.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Return the key for `kid`, refreshing the cache if needed.
    async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError>;
}

/// [`JwksFetcher`] that performs an HTTPS GET against the discovery endpoint.
pub struct HttpJwksFetcher {
    http: reqwest::Client,
    uri: String,
}

impl HttpJwksFetcher {
    /// Create a fetcher for `uri`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(uri: impl Into<String>, timeout: Duration, require_https: bool) -> crate::Result<Self> {
        let http = reqwest::Client::builder()
            .https_only(require_https)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            uri: uri.into(),
        })
    }
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self) -> Result<KeyDocument, KeyError> {
        debug!(uri = %self.uri, "Fetching signing keys");
        let response = self
            .http
            .get(&self.uri)
            .send()
            .await
            .map_err(|e| KeyError::DiscoveryUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyError::DiscoveryUnavailable(format!("HTTP {status}")));
        }

        response
            .json::<KeyDocument>()
            .await
            .map_err(|e| KeyError::DiscoveryUnavailable(format!("malformed key document: {e}")))
    }
}

/// Tuning for [`JwksKeySource`].
#[derive(Debug, Clone, Copy)]
pub struct KeySourceSettings {
    /// How long a snapshot is considered fresh
    pub cache_ttl: Duration,
    /// Minimum spacing between miss-triggered refreshes (and failure cooldown)
    pub min_refresh_interval: Duration,
    /// Upper bound on one fetch
    pub fetch_timeout: Duration,
}

impl Default for KeySourceSettings {
    fn default() -> Self {
        Self::from(&KeysConfig::default())
    }
}

impl From<&KeysConfig> for KeySourceSettings {
    fn from(config: &KeysConfig) -> Self {
        Self {
            cache_ttl: config.cache_ttl,
            min_refresh_interval: config.min_refresh_interval,
            fetch_timeout: config.fetch_timeout,
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<KeySet>, KeyError>>>;

struct KeyCache<F> {
    fetcher: F,
    settings: KeySourceSettings,
    snapshot: RwLock<Arc<KeySet>>,
    in_flight: Mutex<Option<RefreshFuture>>,
    last_failure: Mutex<Option<Instant>>,
    fetches: AtomicU64,
}

impl<F: JwksFetcher> KeyCache<F> {
    fn snapshot(&self) -> Arc<KeySet> {
        Arc::clone(&self.snapshot.read())
    }

    async fn fetch_and_swap(&self) -> Result<Arc<KeySet>, KeyError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let timeout = self.settings.fetch_timeout;

        let outcome = match tokio::time::timeout(timeout, self.fetcher.fetch()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(KeyError::DiscoveryUnavailable(format!(
                "fetch timed out after {}ms",
                timeout.as_millis()
            ))),
        }
        .and_then(|document| {
            let set = KeySet::from_document(&document);
            if set.is_empty() {
                Err(KeyError::DiscoveryUnavailable(
                    "key document has no usable signing keys".to_string(),
                ))
            } else {
                Ok(Arc::new(set))
            }
        });

        match outcome {
            Ok(set) => {
                info!(
                    keys = set.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Signing keys refreshed"
                );
                *self.snapshot.write() = Arc::clone(&set);
                *self.last_failure.lock() = None;
                Ok(set)
            }
            Err(e) => {
                warn!(error = %e, "Signing key refresh failed");
                *self.last_failure.lock() = Some(Instant::now());
                Err(e)
            }
        }
    }
}

/// Caching [`KeySource`] over a [`JwksFetcher`].
///
/// Owns the process-wide key snapshot; construct one per issuer and share it
/// behind an `Arc`.
pub struct JwksKeySource<F> {
    cache: Arc<KeyCache<F>>,
}

/// Key source backed by the real discovery endpoint.
pub type HttpKeySource = JwksKeySource<HttpJwksFetcher>;

impl<F: JwksFetcher> JwksKeySource<F> {
    /// Create an empty cache over `fetcher`.
    pub fn new(fetcher: F, settings: KeySourceSettings) -> Self {
        Self {
            cache: Arc::new(KeyCache {
                fetcher,
                settings,
                snapshot: RwLock::new(Arc::new(KeySet::default())),
                in_flight: Mutex::new(None),
                last_failure: Mutex::new(None),
                fetches: AtomicU64::new(0),
            }),
        }
    }

    /// Fetch the key set now, joining any refresh already in flight.
    ///
    /// Returns the number of usable keys.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::DiscoveryUnavailable`] if the fetch fails.
    pub async fn warm(&self) -> Result<usize, KeyError> {
        let pending = {
            let mut slot = self.cache.in_flight.lock();
            match slot.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = spawn_refresh(Arc::clone(&self.cache));
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };
        pending.await.map(|set| set.len())
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.cache.snapshot()
    }

    /// Number of fetches started so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.cache.fetches.load(Ordering::Relaxed)
    }

    /// Join the in-flight refresh or start one, unless `seen` is already
    /// outdated or a refresh is not yet allowed.
    async fn refreshed(&self, seen: &Arc<KeySet>) -> Result<Arc<KeySet>, KeyError> {
        let settings = self.cache.settings;
        let pending = {
            let mut slot = self.cache.in_flight.lock();
            if let Some(pending) = slot.as_ref() {
                pending.clone()
            } else {
                let current = self.cache.snapshot();
                if !Arc::ptr_eq(&current, seen) {
                    return Ok(current);
                }
                if !current.is_stale(settings.cache_ttl)
                    && current.refreshed_within(settings.min_refresh_interval)
                {
                    debug!("Refresh suppressed by min_refresh_interval");
                    return Ok(current);
                }
                if let Some(failed_at) = *self.cache.last_failure.lock() {
                    if failed_at.elapsed() < settings.min_refresh_interval {
                        return Err(KeyError::DiscoveryUnavailable(
                            "cooling down after failed fetch".to_string(),
                        ));
                    }
                }
                let pending = spawn_refresh(Arc::clone(&self.cache));
                *slot = Some(pending.clone());
                pending
            }
        };
        pending.await
    }
}

/// Run a refresh in its own task so it completes even if every waiter goes away.
fn spawn_refresh<F: JwksFetcher>(cache: Arc<KeyCache<F>>) -> RefreshFuture {
    let task = tokio::spawn(async move {
        let result = cache.fetch_and_swap().await;
        *cache.in_flight.lock() = None;
        result
    });

    task.map(|joined| {
        joined.unwrap_or_else(|e| {
            Err(KeyError::DiscoveryUnavailable(format!(
                "refresh task failed: {e}"
            )))
        })
    })
    .boxed()
    .shared()
}

#[async_trait]
impl<F: JwksFetcher> KeySource for JwksKeySource<F> {
    async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError> {
        let seen = self.cache.snapshot();
        let cached = seen.get(kid);
        if let Some(ref key) = cached {
            if !seen.is_stale(self.cache.settings.cache_ttl) {
                return Ok(Arc::clone(key));
            }
        }

        debug!(kid = %kid, stale_hit = cached.is_some(), "Key cache miss, refreshing");
        match self.refreshed(&seen).await {
            // A successful fetch is authoritative: keys it dropped are revoked.
            Ok(fresh) => fresh
                .get(kid)
                .ok_or_else(|| KeyError::NotFound(kid.to_string())),
            Err(e) => match cached {
                Some(key) => {
                    warn!(kid = %kid, error = %e, "Serving stale signing key");
                    Ok(key)
                }
                None => Err(e),
            },
        }
    }
}

impl<F> fmt::Debug for JwksKeySource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksKeySource")
            .field("keys", &self.cache.snapshot.read().len())
            .field("settings", &self.cache.settings)
            .finish_non_exhaustive()
    }
}
