//! Request/response vocabulary and the network fetcher.
//!
//! The worker never talks to the network directly; it drives a [`Fetcher`].
//! Production uses the reqwest-backed [`HttpFetcher`]; tests substitute
//! scripted fetchers with failure injection and call counters.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Client;
use tracing::{debug, trace};
use url::Url;

use crate::SwError;

/// Request mode, mirroring the platform's fetch modes. Only `Navigate`
/// affects routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Full-document load.
    Navigate,
    /// Sub-resource request.
    #[default]
    NoCors,
    /// Cross-origin request with CORS.
    Cors,
    /// Same-origin only.
    SameOrigin,
}

/// One intercepted outgoing request. Transient: exists only while being
/// handled, never persisted.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
}

impl FetchRequest {
    /// Create a GET sub-resource request.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::NoCors,
        }
    }

    /// Create a navigation (full-document) request.
    pub fn navigate(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Navigate,
        }
    }

    /// Create a request with an explicit method and mode.
    pub fn new(method: Method, url: Url, mode: RequestMode) -> Self {
        Self { method, url, mode }
    }

    /// Whether this is a full-document load.
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// A response as seen by the worker: status, headers, and the full body.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Whether this response was served from the cache store.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Create a response with a status and body.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            from_cache: false,
        }
    }

    /// Check if the status is 2xx.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<String, SwError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| SwError::FetchFailed(e.to_string()))
    }
}

/// Network access seam. Implementations must be cheap to share.
pub trait Fetcher: Send + Sync {
    /// Perform the request. A rejected fetch (network down, refused
    /// connection, platform timeout) surfaces as an error; HTTP error
    /// statuses are successful fetches.
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<FetchResponse, SwError>> + Send;
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "ExostoreSW/1.0".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Production fetcher backed by reqwest.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher.
    pub fn new(config: HttpFetcherConfig) -> Result<Self, SwError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()?;
        debug!("HttpFetcher initialized");
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, SwError> {
        trace!(url = %request.url, method = %request.method, "Fetching resource");

        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        trace!(
            url = %request.url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(FetchResponse {
            status,
            headers,
            body,
            from_cache: false,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fetcher shared by unit tests.

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use http::StatusCode;

    use super::{FetchRequest, FetchResponse, Fetcher};
    use crate::SwError;
    use hashbrown::HashMap;

    /// Fetcher answering from a fixed route table, with failure injection
    /// and a call counter.
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        routes: HashMap<String, (u16, String)>,
        failures: HashSet<String>,
        offline: AtomicBool,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Serve `status`/`body` for the exact URL.
        pub(crate) fn route(mut self, url: &str, status: u16, body: &str) -> Self {
            self.routes
                .insert(url.to_string(), (status, body.to_string()));
            self
        }

        /// Reject fetches for the exact URL.
        pub(crate) fn fail(mut self, url: &str) -> Self {
            self.failures.insert(url.to_string());
            self
        }

        /// Reject every fetch from now on.
        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        /// Number of fetch attempts so far.
        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, SwError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let url = request.url.as_str();
            if self.offline.load(Ordering::SeqCst) {
                return Err(SwError::FetchFailed("network unreachable".to_string()));
            }
            if self.failures.contains(url) {
                return Err(SwError::FetchFailed(format!("connection refused: {url}")));
            }

            match self.routes.get(url) {
                Some((status, body)) => Ok(FetchResponse::new(
                    StatusCode::from_u16(*status).unwrap_or(StatusCode::OK),
                    body.clone(),
                )),
                None => Ok(FetchResponse::new(StatusCode::NOT_FOUND, "not found")),
            }
        }
    }
}
