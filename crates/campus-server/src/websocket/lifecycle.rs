//! Connection lifecycle: `Connecting → Authenticated → Active → Disconnected`.
//!
//! The controller is the only writer of registry and room entries. Every
//! transition for a connection happens under that connection's state lock,
//! which makes activation and teardown mutually exclusive: whichever takes
//! the lock first wins and the other observes the result.

use std::sync::Arc;

use campus_auth::{IdentityVerifier, VerificationError, verify};
use campus_core::{ConnectionId, Identity, RoomKey};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, ConnectionState};
use super::dispatcher::Dispatcher;
use super::registry::ConnectionRegistry;
use super::rooms::RoomMultiplexer;
use crate::metrics::WS_HANDSHAKE_FAILURES_TOTAL;

/// Owns the per-connection state machine.
pub struct LifecycleController {
    verifier: Arc<dyn IdentityVerifier>,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomMultiplexer>,
    outbound_capacity: usize,
    max_dropped_messages: u64,
}

impl LifecycleController {
    /// Create a controller with fresh registry and room tables.
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        outbound_capacity: usize,
        max_dropped_messages: u64,
    ) -> Self {
        Self {
            verifier,
            registry: Arc::new(ConnectionRegistry::new()),
            rooms: Arc::new(RoomMultiplexer::new()),
            outbound_capacity: outbound_capacity.max(1),
            max_dropped_messages,
        }
    }

    /// The registry this controller maintains.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The room tables this controller maintains.
    pub fn rooms(&self) -> &Arc<RoomMultiplexer> {
        &self.rooms
    }

    /// A dispatcher over this controller's registry and rooms.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.registry.clone(), self.rooms.clone())
    }

    /// Allocate a connection in `Connecting` and the receiving end of its
    /// outbound queue.
    pub fn accept(&self) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let conn = ClientConnection::new(ConnectionId::new(), tx, self.max_dropped_messages);
        (Arc::new(conn), rx)
    }

    /// Verify `credential` and move `Connecting → Authenticated`.
    ///
    /// Verification runs with no lock held. On failure the connection goes
    /// straight to `Disconnected` and nothing shared is touched. On success
    /// the identity is stored and the connection is registered.
    pub async fn authenticate(
        &self,
        conn: &Arc<ClientConnection>,
        credential: Option<&str>,
    ) -> Result<Identity, VerificationError> {
        let result = verify(self.verifier.as_ref(), credential).await;

        let mut state = conn.lock_state();
        match result {
            Ok(identity) => {
                if *state != ConnectionState::Connecting {
                    debug!(conn_id = %conn.id, state = ?*state, "verified after teardown, not registering");
                    return Ok(identity);
                }
                let _ = conn.set_identity(identity.clone());
                *state = ConnectionState::Authenticated;
                let _ = self.registry.put(Arc::clone(conn));
                info!(
                    conn_id = %conn.id,
                    subject_id = identity.subject_id(),
                    role = %identity.role(),
                    tenant_id = identity.tenant_id().unwrap_or("-"),
                    "connection authenticated"
                );
                Ok(identity)
            }
            Err(err) => {
                *state = ConnectionState::Disconnected;
                drop(state);
                Err(rejected(conn, err))
            }
        }
    }

    /// Fail a handshake that never produced a verifiable credential (e.g. the
    /// grace period ran out). `Connecting → Disconnected`.
    pub fn reject(&self, conn: &Arc<ClientConnection>, err: VerificationError) -> VerificationError {
        {
            let mut state = conn.lock_state();
            if *state != ConnectionState::Connecting {
                return err;
            }
            *state = ConnectionState::Disconnected;
        }
        rejected(conn, err)
    }

    /// Move `Authenticated → Active`, joining the derived rooms.
    ///
    /// Returns `false` (and changes nothing) unless the connection is
    /// `Authenticated`, e.g. when a disconnect got there first.
    pub fn activate(&self, conn: &Arc<ClientConnection>) -> bool {
        let mut state = conn.lock_state();
        if *state != ConnectionState::Authenticated {
            debug!(conn_id = %conn.id, state = ?*state, "activation skipped");
            return false;
        }
        let Some(identity) = conn.identity() else {
            return false;
        };
        for room in identity.derived_rooms() {
            let _ = self.rooms.join(room, conn);
        }
        *state = ConnectionState::Active;
        debug!(conn_id = %conn.id, "connection active");
        true
    }

    /// Tear the connection down from any state. Idempotent.
    ///
    /// Returns `true` on the call that performed the transition.
    pub fn disconnect(&self, conn: &Arc<ClientConnection>) -> bool {
        let mut state = conn.lock_state();
        if *state == ConnectionState::Disconnected {
            return false;
        }
        let previous = *state;
        *state = ConnectionState::Disconnected;
        let left = self.rooms.leave_all(&conn.id);
        let _ = self.registry.remove(&conn.id);
        debug!(conn_id = %conn.id, from = ?previous, rooms_left = left.len(), "connection torn down");
        true
    }

    /// Subscribe an active connection to ad-hoc room `name`.
    ///
    /// Returns the room key when the request was accepted. Requests from
    /// non-active connections and invalid names are ignored.
    pub fn join(&self, conn: &Arc<ClientConnection>, name: &str) -> Option<RoomKey> {
        let state = conn.lock_state();
        if *state != ConnectionState::Active {
            debug!(conn_id = %conn.id, state = ?*state, room = name, "join ignored, connection not active");
            return None;
        }
        let Some(room) = RoomKey::ad_hoc(name) else {
            debug!(conn_id = %conn.id, room = name, "join ignored, invalid room name");
            return None;
        };
        let _ = self.rooms.join(room.clone(), conn);
        Some(room)
    }

    /// Unsubscribe an active connection from ad-hoc room `name`.
    ///
    /// Derived rooms cannot be left this way.
    pub fn leave(&self, conn: &Arc<ClientConnection>, name: &str) -> Option<RoomKey> {
        let state = conn.lock_state();
        if *state != ConnectionState::Active {
            debug!(conn_id = %conn.id, state = ?*state, room = name, "leave ignored, connection not active");
            return None;
        }
        let Some(room) = RoomKey::ad_hoc(name) else {
            debug!(conn_id = %conn.id, room = name, "leave ignored, invalid room name");
            return None;
        };
        let _ = self.rooms.leave(&room, &conn.id);
        Some(room)
    }
}

fn rejected(conn: &ClientConnection, err: VerificationError) -> VerificationError {
    counter!(WS_HANDSHAKE_FAILURES_TOTAL, "code" => err.close_code().to_string()).increment(1);
    warn!(conn_id = %conn.id, error = %err, "handshake rejected");
    err
}
