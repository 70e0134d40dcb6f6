//! Worker configuration.
//!
//! Everything the worker needs to know at construction time: cache naming,
//! the precache manifest, routing markers, and notification defaults. No
//! ambient globals; tests instantiate several configurations side by side.

use tracing::debug;

/// Notification display defaults.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Notification title.
    pub title: String,
    /// Body text used when a push payload carries none.
    pub default_body: String,
    /// Main icon URL.
    pub icon: String,
    /// Badge icon URL.
    pub badge: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
    /// Icon URL for notification action buttons.
    pub action_icon: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Exostore".to_string(),
            default_body: "New content available!".to_string(),
            icon: "/pwa/icon-192x192.png".to_string(),
            badge: "/pwa/icon-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            action_icon: "/pwa/icon-72x72.png".to_string(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct SwConfig {
    /// Cache name prefix; combined with `version` to name the store.
    pub cache_prefix: String,
    /// Deployment version tag. Must change whenever cached asset content
    /// changes: it is the only signal activation cleanup uses to tell the
    /// current store from stale ones.
    pub version: String,
    /// Origin the worker serves; relative manifest paths resolve against it.
    pub origin: String,
    /// Path of the offline fallback document.
    pub offline_url: String,
    /// Essential resources cached at install time.
    pub precache_manifest: Vec<String>,
    /// URL substrings routed network-first (dynamic content).
    pub network_first_markers: Vec<String>,
    /// URL substrings/suffixes routed cache-first (static assets).
    pub cache_first_markers: Vec<String>,
    /// Background sync tag the worker acts on.
    pub sync_tag: String,
    /// Notification defaults.
    pub notification: NotificationConfig,
}

impl Default for SwConfig {
    fn default() -> Self {
        Self {
            cache_prefix: "exostore".to_string(),
            version: "1.0.0".to_string(),
            origin: "https://exostore.app".to_string(),
            offline_url: "/offline.html".to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/offline.html".to_string(),
                "/manifest.json".to_string(),
            ],
            network_first_markers: vec!["/api/".to_string(), "/supabase/".to_string()],
            cache_first_markers: vec![
                "/assets/".to_string(),
                "/pwa/".to_string(),
                ".css".to_string(),
                ".js".to_string(),
                ".png".to_string(),
                ".jpg".to_string(),
                ".jpeg".to_string(),
                ".gif".to_string(),
                ".webp".to_string(),
                ".svg".to_string(),
                ".woff".to_string(),
                ".woff2".to_string(),
            ],
            sync_tag: "background-sync".to_string(),
            notification: NotificationConfig::default(),
        }
    }
}

impl SwConfig {
    /// Full cache store name for this configuration, e.g. `exostore-v1.0.0`.
    pub fn cache_name(&self) -> String {
        format!("{}-v{}", self.cache_prefix, self.version)
    }

    /// Resolve a possibly-relative path against the configured origin.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.origin.trim_end_matches('/'), path)
        }
    }

    /// Guarantee the offline document is part of the precache manifest.
    /// The navigation strategy depends on its presence.
    pub fn normalized(mut self) -> Self {
        if !self.precache_manifest.contains(&self.offline_url) {
            debug!(offline_url = %self.offline_url, "Adding offline document to precache manifest");
            self.precache_manifest.push(self.offline_url.clone());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_name() {
        let config = SwConfig::default();
        assert_eq!(config.cache_name(), "exostore-v1.0.0");

        let config = SwConfig {
            version: "2.4.1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.cache_name(), "exostore-v2.4.1");
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = SwConfig::default();
        assert_eq!(config.resolve("/offline.html"), "https://exostore.app/offline.html");
        assert_eq!(
            config.resolve("https://cdn.example.com/a.css"),
            "https://cdn.example.com/a.css"
        );
    }

    #[test]
    fn test_normalized_appends_offline_doc() {
        let config = SwConfig {
            offline_url: "/fallback.html".to_string(),
            precache_manifest: vec!["/".to_string()],
            ..Default::default()
        }
        .normalized();

        assert!(config
            .precache_manifest
            .contains(&"/fallback.html".to_string()));
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let config = SwConfig::default().normalized();
        let count = config
            .precache_manifest
            .iter()
            .filter(|u| *u == "/offline.html")
            .count();
        assert_eq!(count, 1);
    }
}
