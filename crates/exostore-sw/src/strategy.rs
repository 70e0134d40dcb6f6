//! Strategy executors.
//!
//! Each executor drives one request to completion against the fetcher and
//! the current cache store. Cache bookkeeping failures are logged and never
//! fail the response path; a fetch failure only propagates when no fallback
//! (cache hit or offline document) exists.

use http::StatusCode;
use tracing::{debug, error, trace, warn};

use crate::cache::{CacheEntry, CacheKey, CacheManager, CacheStore};
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::router::RoutingClass;
use crate::SwError;

/// Dispatch to the executor for a routing class. `Default` shares the
/// network-first algorithm.
pub async fn execute<F, S>(
    class: RoutingClass,
    fetcher: &F,
    cache: &CacheManager<S>,
    request: &FetchRequest,
) -> Result<FetchResponse, SwError>
where
    F: Fetcher,
    S: CacheStore + Default + Send + Sync + 'static,
{
    match class {
        RoutingClass::Navigation => navigation(fetcher, cache, request).await,
        RoutingClass::NetworkFirst | RoutingClass::Default => {
            network_first(fetcher, cache, request).await
        }
        RoutingClass::CacheFirst => cache_first(fetcher, cache, request).await,
    }
}

/// Navigation: network, then cache, then the offline document.
///
/// Any response counts as success here and is cached whatever its status —
/// servers return custom error pages and those must be offline-able too.
/// This is deliberately looser than the 200-only rule the other strategies
/// apply.
pub async fn navigation<F, S>(
    fetcher: &F,
    cache: &CacheManager<S>,
    request: &FetchRequest,
) -> Result<FetchResponse, SwError>
where
    F: Fetcher,
    S: CacheStore + Default + Send + Sync + 'static,
{
    let key = CacheKey::for_request(request);

    match fetcher.fetch(request).await {
        Ok(response) => {
            if let Some(key) = key {
                cache.write_detached(key, CacheEntry::from_response(request.url.as_str(), &response));
            }
            Ok(response)
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "Navigation fetch failed, trying cache");

            if let Some(key) = key {
                if let Some(entry) = cache.lookup(&key).await {
                    return Ok(entry.to_response());
                }
            }

            let offline_key = cache.offline_key()?;
            match cache.lookup(&offline_key).await {
                Some(entry) => {
                    debug!(url = %request.url, "Serving offline document");
                    Ok(entry.to_response())
                }
                None => {
                    // Install's all-or-nothing precache guarantees the
                    // offline document; reaching this means install was
                    // bypassed.
                    error!(url = %request.url, "Offline document absent from cache");
                    Err(SwError::OfflineDocMissing)
                }
            }
        }
    }
}

/// Network-first: live response preferred, cached copy on failure. Only a
/// status-200 response is persisted, and persistence never blocks the
/// caller.
pub async fn network_first<F, S>(
    fetcher: &F,
    cache: &CacheManager<S>,
    request: &FetchRequest,
) -> Result<FetchResponse, SwError>
where
    F: Fetcher,
    S: CacheStore + Default + Send + Sync + 'static,
{
    let key = CacheKey::for_request(request);

    match fetcher.fetch(request).await {
        Ok(response) => {
            if response.status == StatusCode::OK {
                if let Some(key) = key {
                    cache.write_detached(
                        key,
                        CacheEntry::from_response(request.url.as_str(), &response),
                    );
                }
            }
            Ok(response)
        }
        Err(e) => {
            if let Some(key) = key {
                if let Some(entry) = cache.lookup(&key).await {
                    debug!(url = %request.url, "Network failed, serving cached copy");
                    return Ok(entry.to_response());
                }
            }
            // No synthetic response for sub-resources: the failure is the
            // caller's to handle.
            Err(e)
        }
    }
}

/// Cache-first: a hit never touches the network. On a miss the response is
/// fetched and, when status 200, written before returning.
pub async fn cache_first<F, S>(
    fetcher: &F,
    cache: &CacheManager<S>,
    request: &FetchRequest,
) -> Result<FetchResponse, SwError>
where
    F: Fetcher,
    S: CacheStore + Default + Send + Sync + 'static,
{
    let key = CacheKey::for_request(request);

    if let Some(key) = &key {
        if let Some(entry) = cache.lookup(key).await {
            trace!(url = %request.url, "Cache hit");
            return Ok(entry.to_response());
        }
    }

    let response = fetcher.fetch(request).await?;
    if response.status == StatusCode::OK {
        if let Some(key) = key {
            let entry = CacheEntry::from_response(request.url.as_str(), &response);
            if let Err(e) = cache.write(key, entry).await {
                warn!(url = %request.url, error = %e, "Cache write failed");
            }
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::SwConfig;
    use crate::fetch::testing::ScriptedFetcher;
    use url::Url;

    fn shell_fetcher() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .route("https://exostore.app/", 200, "<html>shell</html>")
            .route("https://exostore.app/offline.html", 200, "<html>offline</html>")
            .route("https://exostore.app/manifest.json", 200, "{}")
    }

    async fn installed_manager() -> CacheManager<MemoryCache> {
        let manager = CacheManager::new(&SwConfig::default().normalized());
        manager.install(&shell_fetcher()).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let manager = installed_manager().await;
        let fetcher = ScriptedFetcher::new();
        let request = FetchRequest::get(Url::parse("https://exostore.app/manifest.json").unwrap());

        let response = cache_first(&fetcher, &manager, &request).await.unwrap();

        assert!(response.from_cache);
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_then_caches() {
        let manager = installed_manager().await;
        let fetcher = ScriptedFetcher::new().route(
            "https://exostore.app/assets/app.css",
            200,
            "body{margin:0}",
        );
        let request =
            FetchRequest::get(Url::parse("https://exostore.app/assets/app.css").unwrap());

        let first = cache_first(&fetcher, &manager, &request).await.unwrap();
        assert!(!first.from_cache);

        let second = cache_first(&fetcher, &manager, &request).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.body, first.body);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_miss_propagates_failure() {
        let manager = installed_manager().await;
        let fetcher = ScriptedFetcher::new().fail("https://exostore.app/assets/gone.js");
        let request =
            FetchRequest::get(Url::parse("https://exostore.app/assets/gone.js").unwrap());

        // No fallback document for sub-resources.
        assert!(cache_first(&fetcher, &manager, &request).await.is_err());
    }

    #[tokio::test]
    async fn test_network_first_serves_cache_when_offline() {
        let manager = installed_manager().await;
        let request = FetchRequest::get(Url::parse("https://exostore.app/api/apps").unwrap());

        let fetcher = ScriptedFetcher::new().route(
            "https://exostore.app/api/apps",
            200,
            "[{\"id\":1}]",
        );
        let live = network_first(&fetcher, &manager, &request).await.unwrap();
        assert!(!live.from_cache);

        // Wait for the detached write, then cut the network.
        for _ in 0..50 {
            if manager
                .lookup(&CacheKey::for_request(&request).unwrap())
                .await
                .is_some()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        fetcher.set_offline(true);

        let cached = network_first(&fetcher, &manager, &request).await.unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.status, live.status);
        assert_eq!(cached.body, live.body);
    }

    #[tokio::test]
    async fn test_network_first_propagates_when_nothing_cached() {
        let manager = installed_manager().await;
        let fetcher = ScriptedFetcher::new();
        fetcher.set_offline(true);

        let request = FetchRequest::get(Url::parse("https://exostore.app/api/fresh").unwrap());
        assert!(matches!(
            network_first(&fetcher, &manager, &request).await,
            Err(SwError::FetchFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_network_first_skips_caching_error_statuses() {
        let manager = installed_manager().await;
        let fetcher =
            ScriptedFetcher::new().route("https://exostore.app/api/missing", 500, "oops");
        let request =
            FetchRequest::get(Url::parse("https://exostore.app/api/missing").unwrap());

        let response = network_first(&fetcher, &manager, &request).await.unwrap();
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(manager
            .lookup(&CacheKey::for_request(&request).unwrap())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_navigation_serves_offline_doc_on_cold_miss() {
        let manager = installed_manager().await;
        let fetcher = ScriptedFetcher::new();
        fetcher.set_offline(true);

        let request =
            FetchRequest::navigate(Url::parse("https://exostore.app/apps/detail/7").unwrap());
        let response = navigation(&fetcher, &manager, &request).await.unwrap();

        assert!(response.from_cache);
        assert_eq!(response.body, &b"<html>offline</html>"[..]);
    }

    #[tokio::test]
    async fn test_navigation_prefers_exact_cached_page() {
        let manager = installed_manager().await;
        let request = FetchRequest::navigate(Url::parse("https://exostore.app/").unwrap());

        let fetcher = shell_fetcher();
        fetcher.set_offline(true);

        let response = navigation(&fetcher, &manager, &request).await.unwrap();
        assert_eq!(response.body, &b"<html>shell</html>"[..]);
    }

    #[tokio::test]
    async fn test_navigation_caches_error_pages() {
        let manager = installed_manager().await;
        let fetcher =
            ScriptedFetcher::new().route("https://exostore.app/nope", 404, "<html>404</html>");
        let request = FetchRequest::navigate(Url::parse("https://exostore.app/nope").unwrap());

        let live = navigation(&fetcher, &manager, &request).await.unwrap();
        assert_eq!(live.status, StatusCode::NOT_FOUND);

        // The custom error page must be offline-able too.
        let key = CacheKey::for_request(&request).unwrap();
        for _ in 0..50 {
            if manager.lookup(&key).await.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        fetcher.set_offline(true);
        let cached = navigation(&fetcher, &manager, &request).await.unwrap();
        assert_eq!(cached.status, StatusCode::NOT_FOUND);
        assert_eq!(cached.body, &b"<html>404</html>"[..]);
    }
}
