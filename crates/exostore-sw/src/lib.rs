//! # Exostore Offline Worker
//!
//! Request-interception and offline caching core for the Exostore storefront.
//!
//! ## Features
//!
//! - **Lifecycle**: install, activate, skip-waiting transitions
//! - **Versioned cache store**: one live store per deployment, stale stores
//!   deleted on activation
//! - **Request routing**: ordered rules classify each request into a caching
//!   strategy
//! - **Strategies**: navigation fallback, network-first, cache-first
//! - **Side channels**: push notifications, notification clicks, background
//!   sync acknowledgment
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker (lifecycle driver)
//!     ├── CacheManager ── CacheStorage ── CacheStore (per version)
//!     ├── Router ───────── ordered RouteRules → RoutingClass
//!     ├── strategy::* ──── navigation / network_first / cache_first
//!     └── ClientRegistry ─ controlled pages, claim / open_window
//! ```
//!
//! The worker never owns the network: it drives a [`Fetcher`], so tests and
//! harnesses substitute scripted fetchers while production uses the
//! reqwest-backed [`HttpFetcher`].

use thiserror::Error;

pub mod cache;
pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod strategy;

pub use cache::{CacheEntry, CacheKey, CacheManager, CacheStorage, CacheStore, MemoryCache};
pub use config::{NotificationConfig, SwConfig};
pub use fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher, HttpFetcherConfig, RequestMode};
pub use lifecycle::{
    Client, ClientRegistry, ControlMessage, ServiceWorker, SyncHandler, WorkerState,
};
pub use notify::{Notification, NotificationAction, NotificationClick};
pub use router::{RouteDecision, Router, RoutingClass};

/// Errors that can occur in worker operations.
#[derive(Error, Debug)]
pub enum SwError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Offline document missing from cache")]
    OfflineDocMissing,

    #[error("Invalid worker state: expected {expected}, got {actual}")]
    StateError {
        expected: &'static str,
        actual: WorkerState,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
