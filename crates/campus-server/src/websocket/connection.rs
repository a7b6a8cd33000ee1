//! Per-connection state shared by the session task, the registry and rooms.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use campus_core::{ConnectionId, Identity};
use metrics::counter;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::metrics::{HUB_MESSAGES_DROPPED_TOTAL, WS_SLOW_CLIENT_EVICTIONS_TOTAL};

/// Lifecycle position of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport open, no identity yet.
    Connecting,
    /// Identity verified and stored; present in the registry.
    Authenticated,
    /// Member of its derived rooms; receives events.
    Active,
    /// Torn down. Terminal.
    Disconnected,
}

impl ConnectionState {
    /// Whether a connection in this state belongs in the registry.
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Authenticated | Self::Active)
    }
}

/// Close code and reason a connection was asked to close with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseRequest {
    /// WebSocket close code.
    pub code: u16,
    /// Client-visible reason.
    pub reason: &'static str,
}

/// One live WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    identity: OnceLock<Identity>,
    state: Mutex<ConnectionState>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<str>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat tick.
    pub is_alive: AtomicBool,
    /// When the last pong (or any inbound frame) was seen.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full channel.
    pub dropped_messages: AtomicU64,
    /// Drops tolerated before eviction; `0` disables eviction.
    max_dropped: u64,
    close: CancellationToken,
    close_request: OnceLock<CloseRequest>,
}

impl ClientConnection {
    /// Create a connection in [`ConnectionState::Connecting`].
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>, max_dropped: u64) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity: OnceLock::new(),
            state: Mutex::new(ConnectionState::Connecting),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            max_dropped,
            close: CancellationToken::new(),
            close_request: OnceLock::new(),
        }
    }

    /// The verified identity, once authenticated.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// Store the identity. Returns `false` if one was already set.
    pub(crate) fn set_identity(&self, identity: Identity) -> bool {
        self.identity.set(identity).is_ok()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Lock the lifecycle state. Held across registry/room mutations so a
    /// concurrent disconnect is serialized against activation.
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock()
    }

    /// Enqueue a frame for the client without waiting.
    ///
    /// Returns `false` if the channel is full or closed. A full channel
    /// counts as a drop; once drops reach the eviction threshold the
    /// connection is asked to close.
    pub fn send(&self, frame: Arc<str>) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let drops = self.dropped_messages.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(HUB_MESSAGES_DROPPED_TOTAL).increment(1);
                if self.max_dropped > 0 && drops >= self.max_dropped {
                    let evicting = self.request_close(CloseRequest {
                        code: super::protocol::CLOSE_POLICY_VIOLATION,
                        reason: "Slow consumer",
                    });
                    if evicting {
                        counter!(WS_SLOW_CLIENT_EVICTIONS_TOTAL).increment(1);
                        warn!(conn_id = %self.id, drops, "evicting slow client");
                    }
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Ask the session task to close the transport.
    ///
    /// The first request wins; returns `false` for later ones.
    pub fn request_close(&self, request: CloseRequest) -> bool {
        let first = self.close_request.set(request).is_ok();
        self.close.cancel();
        first
    }

    /// The pending close request, if any.
    pub fn close_request(&self) -> Option<CloseRequest> {
        self.close_request.get().copied()
    }

    /// Resolves once [`Self::request_close`] has been called.
    pub async fn closed(&self) {
        self.close.cancelled().await;
    }

    /// Mark the connection as alive (pong or other inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("subject", &self.identity().map(Identity::subject_id))
            .finish_non_exhaustive()
    }
}
