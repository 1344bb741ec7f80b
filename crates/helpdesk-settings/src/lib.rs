//! # helpdesk-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HelpdeskSettings::default()`]
//! 2. **User file**: `~/.helpdesk/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HELPDESK_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_overrides, deep_merge, load_layers, load_settings_from_path, settings_path, validate,
};
pub use types::*;
