//! Worker lifecycle.
//!
//! The [`ServiceWorker`] mirrors the platform's process-replacement model:
//! a new version installs in the background while the old one keeps serving,
//! waits until activated, then takes over all open pages. The host page can
//! force the handover with a `SKIP_WAITING` control message.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::cache::{CacheManager, CacheStore, MemoryCache};
use crate::config::SwConfig;
use crate::fetch::{FetchRequest, FetchResponse, Fetcher};
use crate::notify::{Notification, NotificationClick, ACTION_EXPLORE};
use crate::router::{RouteDecision, Router};
use crate::{strategy, SwError};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Created but not yet installing.
    #[default]
    Parsed,
    /// Install event in progress (precaching).
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Activate event in progress (stale-store cleanup, claiming clients).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced or failed; never serves again.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Parsed => write!(f, "parsed"),
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Control message from a host page. Unknown message types fail to parse
/// and are silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Force the waiting worker to activate now.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

/// A controlled page.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    pub url: Url,
    pub focused: bool,
    /// Whether this worker controls the page's requests.
    pub controlled: bool,
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Registry of pages this worker can see.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing page (not yet controlled).
    pub fn add(&mut self, url: Url) -> Client {
        let client = Client {
            id: next_client_id(),
            url,
            focused: false,
            controlled: false,
        };
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Remove a client (page closed).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Take control of every known page. Returns how many were claimed.
    pub fn claim(&mut self) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if !client.controlled {
                client.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    /// Open a new focused, controlled window.
    pub fn open_window(&mut self, url: Url) -> Client {
        let client = Client {
            id: next_client_id(),
            url,
            focused: true,
            controlled: true,
        };
        self.clients.insert(client.id.clone(), client.clone());
        client
    }

    /// Number of controlled pages.
    pub fn controlled_count(&self) -> usize {
        self.clients.values().filter(|c| c.controlled).count()
    }

    /// Total number of known pages.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no pages are known.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Host-defined deferred action run when the known sync tag fires.
pub type SyncHandler = Box<dyn Fn() + Send + Sync>;

/// One worker version: lifecycle driver wiring the router, strategies, and
/// cache manager together.
pub struct ServiceWorker<F, S = MemoryCache>
where
    F: Fetcher,
    S: CacheStore + Default + Send + Sync + 'static,
{
    config: SwConfig,
    fetcher: F,
    cache: CacheManager<S>,
    router: Router,
    state: RwLock<WorkerState>,
    clients: RwLock<ClientRegistry>,
    sync_handler: Option<SyncHandler>,
}

impl<F, S> ServiceWorker<F, S>
where
    F: Fetcher,
    S: CacheStore + Default + Send + Sync + 'static,
{
    /// Create a worker with fresh storage.
    pub fn new(config: SwConfig, fetcher: F) -> Self {
        let config = config.normalized();
        let cache = CacheManager::new(&config);
        let router = Router::from_config(&config);
        Self {
            config,
            fetcher,
            cache,
            router,
            state: RwLock::new(WorkerState::Parsed),
            clients: RwLock::new(ClientRegistry::new()),
            sync_handler: None,
        }
    }

    /// Create a worker over existing storage: a new deployment installing
    /// alongside the version currently serving.
    pub fn with_storage(
        config: SwConfig,
        fetcher: F,
        storage: std::sync::Arc<RwLock<crate::cache::CacheStorage<S>>>,
    ) -> Self {
        let config = config.normalized();
        let cache = CacheManager::with_storage(&config, storage);
        let router = Router::from_config(&config);
        Self {
            config,
            fetcher,
            cache,
            router,
            state: RwLock::new(WorkerState::Parsed),
            clients: RwLock::new(ClientRegistry::new()),
            sync_handler: None,
        }
    }

    /// Attach the host-defined background sync action.
    pub fn with_sync_handler(mut self, handler: SyncHandler) -> Self {
        self.sync_handler = Some(handler);
        self
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// The worker's configuration.
    pub fn config(&self) -> &SwConfig {
        &self.config
    }

    /// The cache manager (current store lookups for harnesses and tests).
    pub fn cache(&self) -> &CacheManager<S> {
        &self.cache
    }

    /// Register a page the worker can see.
    pub async fn register_client(&self, url: Url) -> Client {
        self.clients.write().await.add(url)
    }

    /// Number of pages this worker controls.
    pub async fn controlled_clients(&self) -> usize {
        self.clients.read().await.controlled_count()
    }

    /// Install: precache the essential manifest. On failure the worker goes
    /// redundant and a previously active version keeps serving.
    pub async fn install(&self) -> Result<(), SwError> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Parsed {
                return Err(SwError::StateError {
                    expected: "parsed",
                    actual: *state,
                });
            }
            *state = WorkerState::Installing;
        }
        info!(cache = %self.cache.cache_name(), "Installing worker");

        match self.cache.install(&self.fetcher).await {
            Ok(entries) => {
                *self.state.write().await = WorkerState::Installed;
                info!(entries, "Worker installed, waiting to activate");
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = WorkerState::Redundant;
                warn!(error = %e, "Install failed, worker is redundant");
                Err(e)
            }
        }
    }

    /// Activate: delete stale stores, then take control of all open pages
    /// immediately so the new caching logic applies without a reload.
    pub async fn activate(&self) -> Result<(), SwError> {
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Installed {
                return Err(SwError::StateError {
                    expected: "installed",
                    actual: *state,
                });
            }
            *state = WorkerState::Activating;
        }

        let removed = self.cache.activate().await;
        let claimed = self.clients.write().await.claim();
        *self.state.write().await = WorkerState::Activated;

        info!(
            cache = %self.cache.cache_name(),
            stale_removed = removed,
            clients_claimed = claimed,
            "Worker activated"
        );
        Ok(())
    }

    /// Force activation while waiting instead of waiting for page closure.
    /// A no-op in any other state.
    pub async fn skip_waiting(&self) -> Result<(), SwError> {
        if self.state().await == WorkerState::Installed {
            debug!("skip_waiting: forcing activation");
            self.activate().await
        } else {
            trace!(state = %self.state().await, "skip_waiting ignored");
            Ok(())
        }
    }

    /// Handle a JSON control message from a host page. Unrecognized
    /// payloads are ignored without error.
    pub async fn handle_message(&self, raw: &str) -> Result<(), SwError> {
        match serde_json::from_str::<ControlMessage>(raw) {
            Ok(ControlMessage::SkipWaiting) => self.skip_waiting().await,
            Err(_) => {
                trace!(raw, "Ignoring unrecognized control message");
                Ok(())
            }
        }
    }

    /// Handle one intercepted request. `None` means not intercepted: the
    /// host platform performs its default networking (non-GET, non-http,
    /// or the worker is not yet controlling pages).
    pub async fn handle_fetch(
        &self,
        request: &FetchRequest,
    ) -> Result<Option<FetchResponse>, SwError> {
        if self.state().await != WorkerState::Activated {
            trace!(url = %request.url, "Not activated, passing through");
            return Ok(None);
        }

        match self.router.classify(request) {
            RouteDecision::Passthrough => {
                trace!(url = %request.url, "Passthrough");
                Ok(None)
            }
            RouteDecision::Handle(class) => {
                debug!(url = %request.url, strategy = %class, "Handling request");
                strategy::execute(class, &self.fetcher, &self.cache, request)
                    .await
                    .map(Some)
            }
        }
    }

    /// Handle a push message: assemble the notification to display.
    pub fn handle_push(&self, payload: Option<&str>) -> Notification {
        debug!(has_payload = payload.is_some(), "Push received");
        Notification::from_push(&self.config.notification, payload)
    }

    /// Handle a click on a displayed notification. `explore` opens and
    /// focuses the app root; anything else just dismisses.
    pub async fn handle_notification_click(
        &self,
        action: &str,
    ) -> Result<NotificationClick, SwError> {
        if action != ACTION_EXPLORE {
            return Ok(NotificationClick::Dismissed);
        }

        let root = self.config.resolve("/");
        let url = Url::parse(&root).map_err(|e| SwError::InvalidUrl(e.to_string()))?;
        let client = self.clients.write().await.open_window(url);
        debug!(client = %client.id, url = %client.url, "Notification opened app root");
        Ok(NotificationClick::Opened {
            url: client.url.to_string(),
        })
    }

    /// Handle a background sync event. Returns whether the host-defined
    /// deferred action ran; unknown tags are acknowledged without action.
    pub fn handle_sync(&self, tag: &str) -> bool {
        if tag != self.config.sync_tag {
            debug!(tag, "Ignoring unknown sync tag");
            return false;
        }
        match &self.sync_handler {
            Some(handler) => {
                debug!(tag, "Running background sync action");
                handler();
                true
            }
            None => {
                debug!(tag, "No sync action registered");
                false
            }
        }
    }
}
