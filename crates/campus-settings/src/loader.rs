//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HubSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `CAMPUS_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::HubSettings;

/// Resolve the path to the settings file (`~/.campus/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".campus").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HubSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HubSettings> {
    let mut settings = read_layered(path)?;
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<HubSettings> {
    let defaults = serde_json::to_value(HubSettings::default())?;

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

/// Apply `CAMPUS_*` overrides read through `lookup`.
///
/// Invalid values are ignored with a warning (the file/default stays).
pub fn apply_overrides(settings: &mut HubSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CAMPUS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.u64_in("CAMPUS_PORT", 0, u64::from(u16::MAX)) {
        settings.server.port = u16::try_from(v).unwrap_or(settings.server.port);
    }
    if let Some(v) = env.u64_in("CAMPUS_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = usize::try_from(v).unwrap_or(settings.server.max_connections);
    }
    if let Some(v) = env.u64_in("CAMPUS_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.u64_in("CAMPUS_HEARTBEAT_TIMEOUT_SECS", 1, 7200) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.u64_in("CAMPUS_AUTH_GRACE_SECS", 1, 300) {
        settings.server.auth_grace_secs = v;
    }
    if let Some(v) = env.u64_in("CAMPUS_OUTBOUND_CAPACITY", 1, 1_000_000) {
        settings.server.outbound_capacity = usize::try_from(v).unwrap_or(settings.server.outbound_capacity);
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = env.string("CAMPUS_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = env.string("CAMPUS_JWT_ISSUER") {
        settings.auth.issuer = Some(v);
    }
    if let Some(v) = env.u64_in("CAMPUS_JWT_LEEWAY_SECS", 0, 3600) {
        settings.auth.leeway_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CAMPUS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CAMPUS_LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(e) => warn!(key = "CAMPUS_LOG_FORMAT", value = %v, error = %e, "ignoring"),
        }
    }

    // ── Publish ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CAMPUS_PUBLISH_KEY") {
        settings.publish.key = Some(v);
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
