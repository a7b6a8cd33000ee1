//! Room multiplexer: room → members and connection → rooms.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use campus_core::{ConnectionId, RoomKey};
use dashmap::DashMap;
use tracing::trace;

use super::connection::ClientConnection;

/// Subscription table for fan-out.
///
/// `broadcast` enqueues while holding the room's shard read guard and `leave`
/// needs the write guard for the same shard, so once `leave` returns no later
/// broadcast can reach the departed connection. Empty rooms are dropped on
/// the last leave.
///
/// Mutations for a single connection must be serialized by the caller; the
/// lifecycle controller does this under the connection's state lock.
#[derive(Default)]
pub struct RoomMultiplexer {
    rooms: DashMap<RoomKey, HashMap<ConnectionId, Arc<ClientConnection>>>,
    memberships: DashMap<ConnectionId, HashSet<RoomKey>>,
}

impl RoomMultiplexer {
    /// Create an empty multiplexer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `connection` to `room`. Returns `false` if already a member.
    pub fn join(&self, room: RoomKey, connection: &Arc<ClientConnection>) -> bool {
        let id = connection.id.clone();
        let added = self
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(id.clone(), Arc::clone(connection))
            .is_none();
        if added {
            trace!(conn_id = %id, room = %room, "joined room");
            let _ = self.memberships.entry(id).or_default().insert(room);
        }
        added
    }

    /// Unsubscribe `id` from `room`. Returns `false` if it was not a member.
    pub fn leave(&self, room: &RoomKey, id: &ConnectionId) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => members.remove(id).is_some(),
            None => false,
        };
        if !removed {
            return false;
        }
        let _ = self.rooms.remove_if(room, |_, members| members.is_empty());

        if let Some(mut rooms) = self.memberships.get_mut(id) {
            let _ = rooms.remove(room);
        }
        let _ = self.memberships.remove_if(id, |_, rooms| rooms.is_empty());
        trace!(conn_id = %id, room = %room, "left room");
        true
    }

    /// Remove `id` from every room it belongs to.
    ///
    /// Returns the rooms it left; a second call returns an empty list.
    pub fn leave_all(&self, id: &ConnectionId) -> Vec<RoomKey> {
        let Some((_, rooms)) = self.memberships.remove(id) else {
            return Vec::new();
        };
        let mut left = Vec::with_capacity(rooms.len());
        for room in rooms {
            if let Some(mut members) = self.rooms.get_mut(&room) {
                let _ = members.remove(id);
            }
            let _ = self.rooms.remove_if(&room, |_, members| members.is_empty());
            left.push(room);
        }
        left
    }

    /// Enqueue `frame` on every member of `room`.
    ///
    /// Closed or full member channels are skipped and not counted. Unknown
    /// rooms deliver to nobody.
    pub fn broadcast(&self, room: &RoomKey, frame: &Arc<str>) -> usize {
        let Some(members) = self.rooms.get(room) else {
            return 0;
        };
        members
            .values()
            .filter(|conn| conn.send(Arc::clone(frame)))
            .count()
    }

    /// Current members of `room`.
    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms `id` belongs to, sorted.
    pub fn rooms_of(&self, id: &ConnectionId) -> Vec<RoomKey> {
        let mut rooms: Vec<RoomKey> = self
            .memberships
            .get(id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Whether `id` is subscribed to `room`.
    pub fn is_member(&self, room: &RoomKey, id: &ConnectionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|members| members.contains_key(id))
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
