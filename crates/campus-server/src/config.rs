//! Server configuration.

use std::time::Duration;

use campus_settings::HubSettings;
use serde::{Deserialize, Serialize};

use crate::websocket::session::SessionTimings;

/// Configuration for the hub server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket sessions, handshakes included.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Seconds of client silence before the session is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Seconds a client without an upgrade credential has to send `auth`.
    pub auth_grace_secs: u64,
    /// Per-connection outbound queue capacity.
    pub outbound_capacity: usize,
    /// Full-queue drops tolerated before eviction (`0` = never evict).
    pub max_dropped_messages: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Key required by `POST /publish`; the route answers 404 when unset.
    pub publish_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            auth_grace_secs: 10,
            outbound_capacity: 1024,
            max_dropped_messages: 100,
            max_message_size: 64 * 1024,
            publish_key: None,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &HubSettings) -> Self {
        let s = &settings.server;
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            auth_grace_secs: s.auth_grace_secs,
            outbound_capacity: s.outbound_capacity,
            max_dropped_messages: s.max_dropped_messages,
            max_message_size: s.max_message_size,
            publish_key: settings.publish.key.clone().filter(|k| !k.is_empty()),
        }
    }

    /// Timings handed to every session.
    pub fn session_timings(&self) -> SessionTimings {
        SessionTimings {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs.max(1)),
            auth_grace: Duration::from_secs(self.auth_grace_secs.max(1)),
        }
    }
}
