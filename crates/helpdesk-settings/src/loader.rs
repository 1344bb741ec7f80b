//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HelpdeskSettings::default()`]
//! 2. If `~/.helpdesk/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `HELPDESK_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::HelpdeskSettings;

/// Resolve the path to the settings file (`~/.helpdesk/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".helpdesk").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HelpdeskSettings> {
    let settings = load_layers(path, |name| std::env::var(name).ok())?;
    validate(&settings)?;
    Ok(settings)
}

/// File layer plus overrides read through `lookup`, without validation.
///
/// Callers that layer their own overrides on top (command-line flags) must
/// call [`validate`] afterwards.
pub fn load_layers<F>(path: &Path, lookup: F) -> Result<HelpdeskSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = load_file_layer(path)?;
    apply_overrides(&mut settings, lookup);
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<HelpdeskSettings> {
    let defaults = serde_json::to_value(HelpdeskSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `HELPDESK_*` overrides read through `lookup`.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_overrides<F>(settings: &mut HelpdeskSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── API ─────────────────────────────────────────────────────────
    if let Some(v) = env.string("HELPDESK_API_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = env.u64("HELPDESK_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.api.request_timeout_ms = v;
    }

    // ── Real-time channel ───────────────────────────────────────────
    if let Some(v) = env.string("HELPDESK_WS_URL") {
        settings.realtime.ws_url = v;
    }
    if let Some(v) = env.u64("HELPDESK_HEARTBEAT_INTERVAL_MS", 1_000, 600_000) {
        settings.realtime.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.u64("HELPDESK_RECONNECT_DELAY_MS", 100, 600_000) {
        settings.realtime.reconnect_delay_ms = v;
    }
    if let Some(v) = env.usize("HELPDESK_MAX_NOTIFICATIONS", 1, 10_000) {
        settings.realtime.max_notifications = v;
    }
    if let Some(v) = env.string("HELPDESK_NOTIFICATION_TITLE") {
        settings.realtime.notification_title = v;
    }
    if let Some(v) = env.bool("HELPDESK_SYSTEM_NOTIFICATIONS") {
        settings.realtime.system_notifications = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("HELPDESK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("HELPDESK_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Reject values the client cannot run with.
pub fn validate(settings: &HelpdeskSettings) -> Result<()> {
    let rt = &settings.realtime;
    if rt.max_notifications == 0 {
        return Err(SettingsError::InvalidValue(
            "realtime.maxNotifications must be at least 1".into(),
        ));
    }
    if rt.heartbeat_interval_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "realtime.heartbeatIntervalMs must be positive".into(),
        ));
    }
    if !(rt.ws_url.starts_with("ws://") || rt.ws_url.starts_with("wss://")) {
        return Err(SettingsError::InvalidValue(format!(
            "realtime.wsUrl must be a ws:// or wss:// URL, got {}",
            rt.ws_url
        )));
    }
    if !(settings.api.base_url.starts_with("http://") || settings.api.base_url.starts_with("https://")) {
        return Err(SettingsError::InvalidValue(format!(
            "api.baseUrl must be an http(s) URL, got {}",
            settings.api.base_url
        )));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}
