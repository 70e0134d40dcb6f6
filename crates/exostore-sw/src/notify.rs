//! Push notification display values and click outcomes.
//!
//! The worker only assembles what to show; rendering belongs to the host
//! platform. Payload text overrides the configured default body.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::NotificationConfig;

/// Action identifier for opening the app.
pub const ACTION_EXPLORE: &str = "explore";
/// Action identifier for dismissing the notification.
pub const ACTION_CLOSE: &str = "close";

/// One action button on a notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// A notification ready for display.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
    /// Arrival timestamp (ms since epoch).
    pub arrived_at: u64,
}

impl Notification {
    /// Build a notification from a push payload, falling back to the
    /// configured body text when the payload carries none.
    pub fn from_push(config: &NotificationConfig, payload: Option<&str>) -> Self {
        let body = payload
            .filter(|p| !p.is_empty())
            .unwrap_or(&config.default_body)
            .to_string();

        Self {
            title: config.title.clone(),
            body,
            icon: config.icon.clone(),
            badge: config.badge.clone(),
            vibrate: config.vibrate.clone(),
            actions: vec![
                NotificationAction {
                    action: ACTION_EXPLORE.to_string(),
                    title: "Explore".to_string(),
                    icon: config.action_icon.clone(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Close".to_string(),
                    icon: config.action_icon.clone(),
                },
            ],
            arrived_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
        }
    }
}

/// What a notification click resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationClick {
    /// A window was opened/focused at the given URL.
    Opened { url: String },
    /// The notification was dismissed with no further action.
    Dismissed,
}
