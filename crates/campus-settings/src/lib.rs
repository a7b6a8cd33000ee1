//! # campus-settings
//!
//! Configuration with layered sources for the campus event hub.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HubSettings::default()`]
//! 2. **User file**: `~/.campus/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `CAMPUS_*` overrides (highest priority)
//!
//! Settings are plain values handed to the server at construction; there is
//! no process-global instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_overrides, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{AuthSettings, HubSettings, LoggingSettings, PublishSettings, ServerSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
