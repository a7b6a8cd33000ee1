//! Settings types.

use campus_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Network and connection limits.
    pub server: ServerSettings,
    /// Token verification.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// HTTP publish endpoint.
    pub publish: PublishSettings,
}

impl HubSettings {
    /// Reject settings the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "auth.jwtSecret is empty (set CAMPUS_JWT_SECRET)".into(),
            ));
        }
        let s = &self.server;
        if s.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be > 0".into(),
            ));
        }
        if s.heartbeat_timeout_secs < s.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "server.heartbeatTimeoutSecs ({}) is shorter than the interval ({})",
                s.heartbeat_timeout_secs, s.heartbeat_interval_secs
            )));
        }
        if s.outbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundCapacity must be > 0".into(),
            ));
        }
        if s.auth_grace_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.authGraceSecs must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` = auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a client is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Seconds a client has to present a credential after upgrade.
    pub auth_grace_secs: u64,
    /// Per-connection outbound queue capacity.
    pub outbound_capacity: usize,
    /// Dropped messages tolerated before a slow client is evicted.
    pub max_dropped_messages: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            max_connections: 10_000,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            auth_grace_secs: 10,
            outbound_capacity: 1024,
            max_dropped_messages: 100,
            max_message_size: 64 * 1024,
        }
    }
}

/// Token verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret shared with the token issuer.
    pub jwt_secret: String,
    /// Required `iss` claim, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Clock skew tolerated on `exp`.
    pub leeway_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: None,
            leeway_secs: 30,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive, e.g. `"info"` or `"campus_server=debug"`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// HTTP publish endpoint settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishSettings {
    /// Shared key expected in `x-publish-key`; endpoint disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}
