//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of keys; missing fields take the compiled
//! default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type for the help-desk client.
///
/// ```json
/// {
///   "api": { "baseUrl": "https://helpdesk.internal/api/v1" },
///   "realtime": { "reconnectDelayMs": 10000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HelpdeskSettings {
    /// REST API settings.
    pub api: ApiSettings,
    /// Real-time notification channel settings.
    pub realtime: RealtimeSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// REST API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Base URL every REST path is joined onto.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/v1".to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

impl ApiSettings {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Real-time notification channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// WebSocket endpoint; the session token is appended as `?token=`.
    pub ws_url: String,
    /// Interval between heartbeat frames while connected.
    pub heartbeat_interval_ms: u64,
    /// Fixed delay before reconnecting after an abnormal close.
    pub reconnect_delay_ms: u64,
    /// Maximum notifications kept in memory (oldest evicted first).
    pub max_notifications: usize,
    /// Title of system-level notifications.
    pub notification_title: String,
    /// Whether to emit system-level notifications at all.
    pub system_notifications: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000/api/v1/notifications/ws".to_string(),
            heartbeat_interval_ms: 30_000,
            reconnect_delay_ms: 5_000,
            max_notifications: 50,
            notification_title: "Help Desk".to_string(),
            system_notifications: true,
        }
    }
}

impl RealtimeSettings {
    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reconnect delay as a [`Duration`].
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
