//! Versioned cache store.
//!
//! [`CacheStore`] is the injectable key-value seam; [`MemoryCache`] is the
//! default implementation. [`CacheStorage`] holds one store per version name,
//! and [`CacheManager`] owns the lifecycle: precache on install, delete stale
//! stores on activation. Strategy executors read and write the current store
//! through the manager but never create or delete stores.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SwConfig;
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::SwError;

/// Normalized cache key: method + URL. Only GET requests are cacheable, so
/// the constructors are the enforcement point — a non-GET request simply has
/// no key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a request, or `None` for non-GET methods.
    pub fn for_request(request: &FetchRequest) -> Option<Self> {
        if request.method != http::Method::GET {
            return None;
        }
        Some(Self(request.url.as_str().to_string()))
    }

    /// Key for a GET of the given URL.
    pub fn for_url(url: &Url) -> Self {
        Self(url.as_str().to_string())
    }

    /// The keyed URL.
    pub fn url(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GET {}", self.0)
    }
}

/// A captured response snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,
    /// Request method (always GET).
    pub method: String,
    /// Response status.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Capture timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for the given URL.
    pub fn from_response(url: &str, response: &FetchResponse) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: now_millis(),
        }
    }

    /// Rebuild a response from this snapshot, marked as cache-served.
    pub fn to_response(&self) -> FetchResponse {
        let mut headers = http::HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                http::HeaderName::try_from(name.as_str()),
                http::HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }

        FetchResponse {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: self.body.clone().into(),
            from_cache: true,
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Injectable key-value store for one cache version. Values are replaced
/// wholesale per key; last writer wins.
pub trait CacheStore: Send + Sync {
    /// Look up an entry.
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    /// Write an entry, replacing any previous value for the key.
    fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Result<(), SwError>;

    /// Remove an entry. Returns whether it existed.
    fn delete(&mut self, key: &CacheKey) -> bool;

    /// All keys currently stored.
    fn keys(&self) -> Vec<CacheKey>;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default in-memory store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<String, CacheEntry>,
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key.url()).cloned()
    }

    fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Result<(), SwError> {
        self.entries.insert(key.url().to_string(), entry);
        Ok(())
    }

    fn delete(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key.url()).is_some()
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.entries
            .values()
            .map(|e| CacheKey(e.url.clone()))
            .collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Named-store registry: one store per version name.
#[derive(Debug, Default)]
pub struct CacheStorage<S: CacheStore + Default> {
    caches: HashMap<String, S>,
}

impl<S: CacheStore + Default> CacheStorage<S> {
    /// Create empty storage.
    pub fn new() -> Self {
        Self {
            caches: HashMap::new(),
        }
    }

    /// Open a store, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut S {
        self.caches.entry(name.to_string()).or_default()
    }

    /// Non-creating lookup.
    pub fn store(&self, name: &str) -> Option<&S> {
        self.caches.get(name)
    }

    /// Check if a store exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a store and all its entries. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All store names.
    pub fn names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }
}

/// Owner of the versioned store lifecycle.
pub struct CacheManager<S: CacheStore + Default + Send + Sync + 'static> {
    storage: Arc<RwLock<CacheStorage<S>>>,
    cache_name: String,
    offline_url: String,
    manifest: Vec<String>,
}

impl<S: CacheStore + Default + Send + Sync + 'static> CacheManager<S> {
    /// Create a manager for the configured version. Manifest paths resolve
    /// against the configured origin.
    pub fn new(config: &SwConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(CacheStorage::new())),
            cache_name: config.cache_name(),
            offline_url: config.resolve(&config.offline_url),
            manifest: config
                .precache_manifest
                .iter()
                .map(|p| config.resolve(p))
                .collect(),
        }
    }

    /// Create a manager sharing storage with another (a new deployment over
    /// the same storage, as when a new worker version installs alongside an
    /// active one).
    pub fn with_storage(config: &SwConfig, storage: Arc<RwLock<CacheStorage<S>>>) -> Self {
        Self {
            storage,
            cache_name: config.cache_name(),
            offline_url: config.resolve(&config.offline_url),
            manifest: config
                .precache_manifest
                .iter()
                .map(|p| config.resolve(p))
                .collect(),
        }
    }

    /// Name of the store this manager considers current.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Shared handle to the underlying storage.
    pub fn storage(&self) -> Arc<RwLock<CacheStorage<S>>> {
        Arc::clone(&self.storage)
    }

    /// Key of the offline fallback document.
    pub fn offline_key(&self) -> Result<CacheKey, SwError> {
        let url =
            Url::parse(&self.offline_url).map_err(|e| SwError::InvalidUrl(e.to_string()))?;
        Ok(CacheKey::for_url(&url))
    }

    /// Precache the essential manifest into the current version's store.
    ///
    /// All-or-nothing: every manifest URL must fetch with a success status
    /// before anything is committed; on failure nothing of this version
    /// survives. Returns the number of entries written.
    pub async fn install<F: Fetcher>(&self, fetcher: &F) -> Result<usize, SwError> {
        info!(cache = %self.cache_name, resources = self.manifest.len(), "Precaching essential resources");

        let mut staged = Vec::with_capacity(self.manifest.len());
        for raw in &self.manifest {
            let url = Url::parse(raw).map_err(|e| SwError::InvalidUrl(e.to_string()))?;
            let request = FetchRequest::get(url.clone());

            let response = fetcher.fetch(&request).await.map_err(|e| {
                SwError::InstallFailed(format!("precache fetch for {raw} failed: {e}"))
            })?;
            if !response.ok() {
                return Err(SwError::InstallFailed(format!(
                    "precache fetch for {raw} returned {}",
                    response.status
                )));
            }

            debug!(url = %url, status = %response.status, "Precached resource");
            staged.push((
                CacheKey::for_url(&url),
                CacheEntry::from_response(url.as_str(), &response),
            ));
        }

        let count = staged.len();
        let mut storage = self.storage.write().await;
        let mut put_err = None;
        {
            let store = storage.open(&self.cache_name);
            for (key, entry) in staged {
                if let Err(e) = store.put(key, entry) {
                    put_err = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = put_err {
            storage.delete(&self.cache_name);
            return Err(SwError::InstallFailed(format!("precache write failed: {e}")));
        }

        info!(cache = %self.cache_name, entries = count, "Install precache complete");
        Ok(count)
    }

    /// Delete every store whose name is not the current cache name.
    /// Deletion problems are logged, never fatal. Returns how many stores
    /// were removed.
    pub async fn activate(&self) -> usize {
        let mut storage = self.storage.write().await;
        let stale: Vec<String> = storage
            .names()
            .into_iter()
            .filter(|name| name != &self.cache_name)
            .collect();

        let mut removed = 0;
        for name in stale {
            if storage.delete(&name) {
                info!(cache = %name, "Deleted stale cache store");
                removed += 1;
            } else {
                warn!(cache = %name, "Stale cache store vanished during cleanup");
            }
        }
        removed
    }

    /// Look up an entry in the current store.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let storage = self.storage.read().await;
        storage.store(&self.cache_name).and_then(|s| s.get(key))
    }

    /// Write an entry into the current store.
    pub async fn write(&self, key: CacheKey, entry: CacheEntry) -> Result<(), SwError> {
        let mut storage = self.storage.write().await;
        storage.open(&self.cache_name).put(key, entry)
    }

    /// Fire-and-forget write: persistence must not block returning the live
    /// response. Failures are logged.
    pub fn write_detached(&self, key: CacheKey, entry: CacheEntry) {
        let storage = Arc::clone(&self.storage);
        let cache_name = self.cache_name.clone();
        tokio::spawn(async move {
            let mut storage = storage.write().await;
            if let Err(e) = storage.open(&cache_name).put(key, entry) {
                warn!(cache = %cache_name, error = %e, "Background cache write failed");
            }
        });
    }

    /// Number of entries in the current store.
    pub async fn entry_count(&self) -> usize {
        let storage = self.storage.read().await;
        storage.store(&self.cache_name).map_or(0, |s| s.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedFetcher;
    use http::Method;

    fn entry(url: &str, status: u16, body: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status,
            headers: HashMap::new(),
            body: body.as_bytes().to_vec(),
            cached_at: 0,
        }
    }

    #[test]
    fn test_cache_key_rejects_non_get() {
        let url = Url::parse("https://exostore.app/api/apps").unwrap();
        let post = FetchRequest::new(Method::POST, url.clone(), Default::default());
        assert!(CacheKey::for_request(&post).is_none());

        let get = FetchRequest::get(url);
        assert!(CacheKey::for_request(&get).is_some());
    }

    #[test]
    fn test_entry_round_trip_preserves_body_and_status() {
        let mut response = FetchResponse::new(StatusCode::CREATED, "payload-bytes");
        response.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain"),
        );

        let entry = CacheEntry::from_response("https://exostore.app/x", &response);
        let restored = entry.to_response();

        assert_eq!(restored.status, StatusCode::CREATED);
        assert_eq!(restored.body, response.body);
        assert_eq!(
            restored.headers.get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
        assert!(restored.from_cache);
    }

    #[test]
    fn test_memory_cache_put_get_delete() {
        let mut cache = MemoryCache::default();
        let url = Url::parse("https://exostore.app/a.css").unwrap();
        let key = CacheKey::for_url(&url);

        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), entry(key.url(), 200, "body")).unwrap();
        assert_eq!(cache.get(&key).unwrap().body, b"body");
        assert_eq!(cache.len(), 1);

        assert!(cache.delete(&key));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_storage_open_has_delete() {
        let mut storage: CacheStorage<MemoryCache> = CacheStorage::new();
        assert!(!storage.has("exostore-v1.0.0"));

        storage.open("exostore-v1.0.0");
        assert!(storage.has("exostore-v1.0.0"));
        assert!(storage.store("exostore-v1.0.0").is_some());

        assert!(storage.delete("exostore-v1.0.0"));
        assert!(!storage.has("exostore-v1.0.0"));
    }

    #[tokio::test]
    async fn test_install_precaches_manifest() {
        let fetcher = ScriptedFetcher::new()
            .route("https://exostore.app/", 200, "<html>shell</html>")
            .route("https://exostore.app/offline.html", 200, "<html>offline</html>")
            .route("https://exostore.app/manifest.json", 200, "{}");

        let manager: CacheManager<MemoryCache> = CacheManager::new(&SwConfig::default());
        let count = manager.install(&fetcher).await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(manager.entry_count().await, 3);

        let offline = manager
            .lookup(&manager.offline_key().unwrap())
            .await
            .unwrap();
        assert_eq!(offline.body, b"<html>offline</html>");
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        // manifest.json is unreachable: nothing of the version may survive.
        let fetcher = ScriptedFetcher::new()
            .route("https://exostore.app/", 200, "<html>shell</html>")
            .route("https://exostore.app/offline.html", 200, "<html>offline</html>")
            .fail("https://exostore.app/manifest.json");

        let manager: CacheManager<MemoryCache> = CacheManager::new(&SwConfig::default());
        let result = manager.install(&fetcher).await;

        assert!(matches!(result, Err(SwError::InstallFailed(_))));
        assert_eq!(manager.entry_count().await, 0);
        assert!(!manager.storage().read().await.has("exostore-v1.0.0"));
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let fetcher = ScriptedFetcher::new()
            .route("https://exostore.app/", 200, "ok")
            .route("https://exostore.app/offline.html", 404, "missing")
            .route("https://exostore.app/manifest.json", 200, "{}");

        let manager: CacheManager<MemoryCache> = CacheManager::new(&SwConfig::default());
        assert!(matches!(
            manager.install(&fetcher).await,
            Err(SwError::InstallFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_stores() {
        let v1 = SwConfig::default();
        let v2 = SwConfig {
            version: "2.0.0".to_string(),
            ..Default::default()
        };

        let fetcher = ScriptedFetcher::new()
            .route("https://exostore.app/", 200, "shell")
            .route("https://exostore.app/offline.html", 200, "offline")
            .route("https://exostore.app/manifest.json", 200, "{}");

        let manager_v1: CacheManager<MemoryCache> = CacheManager::new(&v1);
        manager_v1.install(&fetcher).await.unwrap();

        let manager_v2 = CacheManager::with_storage(&v2, manager_v1.storage());
        manager_v2.install(&fetcher).await.unwrap();

        let removed = manager_v2.activate().await;
        assert_eq!(removed, 1);

        let storage = manager_v2.storage();
        let storage = storage.read().await;
        assert_eq!(storage.names(), vec!["exostore-v2.0.0".to_string()]);
    }

    #[tokio::test]
    async fn test_write_detached_lands_eventually() {
        let manager: CacheManager<MemoryCache> = CacheManager::new(&SwConfig::default());
        let url = Url::parse("https://exostore.app/api/apps").unwrap();
        let key = CacheKey::for_url(&url);

        manager.write_detached(key.clone(), entry(key.url(), 200, "apps"));

        // Poll until the spawned write lands.
        for _ in 0..50 {
            if manager.lookup(&key).await.is_some() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("detached write never landed");
    }
}
