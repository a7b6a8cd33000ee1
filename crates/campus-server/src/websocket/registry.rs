//! Process-wide table of authenticated connections.

use std::collections::HashSet;
use std::sync::Arc;

use campus_core::ConnectionId;
use dashmap::DashMap;
use tracing::warn;

use super::connection::{ClientConnection, ConnectionState};

/// Maps connection IDs to connections and subjects to their connection IDs.
///
/// Both maps are sharded, so operations on unrelated IDs do not contend.
/// No method holds a guard on one map while touching the other.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ClientConnection>>,
    subjects: DashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an authenticated connection.
    ///
    /// Returns `false` if the connection has no identity or is already present.
    pub fn put(&self, connection: Arc<ClientConnection>) -> bool {
        let Some(subject) = connection.identity().map(|i| i.subject_id().to_owned()) else {
            warn!(conn_id = %connection.id, "refusing to register connection without identity");
            return false;
        };
        let id = connection.id.clone();
        if self.connections.insert(id.clone(), connection).is_some() {
            return false;
        }
        let _ = self.subjects.entry(subject).or_default().insert(id);
        true
    }

    /// Remove a connection. Absent IDs are a no-op.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let (_, connection) = self.connections.remove(id)?;
        if let Some(subject) = connection.identity().map(|i| i.subject_id()) {
            if let Some(mut ids) = self.subjects.get_mut(subject) {
                let _ = ids.remove(id);
            }
            let _ = self.subjects.remove_if(subject, |_, ids| ids.is_empty());
        }
        Some(connection)
    }

    /// Look up a connection by ID.
    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Every live connection of `subject_id` (one per open tab/device).
    pub fn connections_for_subject(&self, subject_id: &str) -> Vec<Arc<ClientConnection>> {
        let ids: Vec<ConnectionId> = match self.subjects.get(subject_id) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.lookup(id)).collect()
    }

    /// Whether `subject_id` has at least one registered connection.
    pub fn is_online(&self, subject_id: &str) -> bool {
        self.subjects.contains_key(subject_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of distinct online subjects.
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }

    /// Enqueue `frame` on every `Active` connection.
    ///
    /// Connections still between authentication and activation are skipped so
    /// nothing overtakes their welcome frame. Returns how many connections
    /// accepted it.
    pub fn send_all(&self, frame: &Arc<str>) -> usize {
        // Snapshot first: the state lock must not be taken under a shard
        // guard, since teardown takes them in the opposite order.
        let targets: Vec<Arc<ClientConnection>> = self
            .connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        targets
            .iter()
            .filter(|conn| conn.state() == ConnectionState::Active && conn.send(Arc::clone(frame)))
            .count()
    }
}
