//! Client frames and server control replies.

use std::sync::Arc;

use campus_core::{Envelope, Identity, RoomKey, events};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

/// Close code for server shutdown and heartbeat timeout.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for slow-consumer eviction.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// A frame sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Credential presented after the upgrade.
    Auth {
        /// Bearer token.
        token: String,
    },
    /// Subscribe to an ad-hoc room.
    Join {
        /// Room name.
        room: String,
    },
    /// Unsubscribe from an ad-hoc room.
    Leave {
        /// Room name.
        room: String,
    },
    /// Application-level keepalive.
    Ping,
}

impl ClientFrame {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Serialize a control reply, logging (and dropping) on failure.
pub fn reply(event: &str, data: Value) -> Option<Arc<str>> {
    match Envelope::new(event, data).to_frame() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(event, error = %e, "failed to serialize reply");
            None
        }
    }
}

/// `connection.established` body sent once the connection is active.
pub fn welcome(connection_id: &str, identity: &Identity, rooms: &[RoomKey]) -> Option<Arc<str>> {
    reply(
        events::CONNECTION_ESTABLISHED,
        json!({
            "connectionId": connection_id,
            "subjectId": identity.subject_id(),
            "role": identity.role(),
            "tenantId": identity.tenant_id(),
            "rooms": rooms,
        }),
    )
}

/// `room.joined` / `room.left` acknowledgement.
pub fn room_ack(event: &str, room: &RoomKey) -> Option<Arc<str>> {
    reply(event, json!({ "room": room }))
}

/// `error` reply for frames the hub could not act on.
pub fn error(message: &str) -> Option<Arc<str>> {
    reply(events::ERROR, json!({ "message": message }))
}
