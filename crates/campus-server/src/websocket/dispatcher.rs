//! Typed fan-out: user, tenant, role, ad-hoc room, everyone.

use std::sync::Arc;

use campus_core::{Envelope, Role, RoomKey};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use super::rooms::RoomMultiplexer;
use crate::metrics::HUB_MESSAGES_DELIVERED_TOTAL;

/// Entry point for domain modules that want to notify live clients.
///
/// Every operation serializes the envelope once, enqueues without waiting on
/// any peer, and returns how many connections accepted the frame. Offline
/// targets yield `0`; nothing here fails.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomMultiplexer>,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry and multiplexer.
    pub fn new(registry: Arc<ConnectionRegistry>, rooms: Arc<RoomMultiplexer>) -> Self {
        Self { registry, rooms }
    }

    /// Every connection of `subject_id`.
    pub fn send_to_user(&self, subject_id: &str, event: &str, data: Value) -> usize {
        self.to_room(&RoomKey::user(subject_id), "user", event, data)
    }

    /// Every connection in tenant `tenant_id`.
    pub fn send_to_tenant(&self, tenant_id: &str, event: &str, data: Value) -> usize {
        self.to_room(&RoomKey::tenant(tenant_id), "tenant", event, data)
    }

    /// Every connection with `role`, across tenants.
    pub fn send_to_role(&self, role: Role, event: &str, data: Value) -> usize {
        self.to_room(&RoomKey::role(role), "role", event, data)
    }

    /// Members of the ad-hoc room `name`. Reserved or invalid names reach nobody.
    pub fn send_to_room(&self, name: &str, event: &str, data: Value) -> usize {
        let Some(room) = RoomKey::ad_hoc(name) else {
            debug!(room = name, event, "not an ad-hoc room name, nothing sent");
            return 0;
        };
        self.to_room(&room, "room", event, data)
    }

    /// Every active connection.
    pub fn broadcast_all(&self, event: &str, data: Value) -> usize {
        let Some(frame) = encode(event, data) else {
            return 0;
        };
        let delivered = self.registry.send_all(&frame);
        record(delivered, "all");
        debug!(event, delivered, "broadcast to all");
        delivered
    }

    fn to_room(&self, room: &RoomKey, target: &'static str, event: &str, data: Value) -> usize {
        let Some(frame) = encode(event, data) else {
            return 0;
        };
        let delivered = self.rooms.broadcast(room, &frame);
        record(delivered, target);
        debug!(room = %room, event, delivered, "dispatched");
        delivered
    }
}

fn encode(event: &str, data: Value) -> Option<Arc<str>> {
    match Envelope::new(event, data).to_frame() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(event, error = %e, "failed to serialize event");
            None
        }
    }
}

fn record(delivered: usize, target: &'static str) {
    counter!(HUB_MESSAGES_DELIVERED_TOTAL, "target" => target).increment(delivered as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::{ClientConnection, ConnectionState};
    use campus_core::{ConnectionId, Identity, events};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomMultiplexer>,
        dispatcher: Dispatcher,
    }

    impl Fixture {
        fn new() -> Self {
            let registry = Arc::new(ConnectionRegistry::new());
            let rooms = Arc::new(RoomMultiplexer::new());
            let dispatcher = Dispatcher::new(registry.clone(), rooms.clone());
            Self { registry, rooms, dispatcher }
        }

        /// Register and join derived rooms, bypassing the controller.
        fn online(&self, id: &str, identity: Identity) -> mpsc::Receiver<Arc<str>> {
            let (tx, rx) = mpsc::channel(16);
            let conn = Arc::new(ClientConnection::new(ConnectionId::from(id), tx, 0));
            let rooms = identity.derived_rooms();
            let _ = conn.set_identity(identity);
            *conn.lock_state() = ConnectionState::Active;
            let _ = self.registry.put(conn.clone());
            for room in rooms {
                let _ = self.rooms.join(room, &conn);
            }
            rx
        }
    }

    fn ident(sub: &str, role: Role, tenant: Option<&str>) -> Identity {
        Identity::new(sub, role, tenant.map(str::to_owned)).unwrap()
    }

    fn event_of(rx: &mut mpsc::Receiver<Arc<str>>) -> Option<Value> {
        rx.try_recv().ok().map(|f| serde_json::from_str(&f).unwrap())
    }

    #[test]
    fn tenant_and_role_targeting() {
        let fx = Fixture::new();
        let mut a = fx.online("a", ident("teacher-1", Role::Teacher, Some("school-42")));
        let mut b = fx.online("b", ident("student-1", Role::Student, Some("school-42")));

        let n = fx.dispatcher.send_to_tenant("school-42", events::EVENT_ANNOUNCED, json!({"title": "Sports day"}));
        assert_eq!(n, 2);
        assert_eq!(event_of(&mut a).unwrap()["event"], "event:announced");
        assert_eq!(event_of(&mut b).unwrap()["data"]["title"], "Sports day");

        let n = fx.dispatcher.send_to_role(Role::Teacher, events::EXAM_SCHEDULED, json!({}));
        assert_eq!(n, 1);
        assert!(event_of(&mut a).is_some());
        assert!(event_of(&mut b).is_none());
    }

    #[test]
    fn user_fans_out_to_every_tab() {
        let fx = Fixture::new();
        let mut tab1 = fx.online("t1", ident("parent-7", Role::Parent, Some("s1")));
        let mut tab2 = fx.online("t2", ident("parent-7", Role::Parent, Some("s1")));
        let mut other = fx.online("t3", ident("parent-8", Role::Parent, Some("s1")));

        let n = fx.dispatcher.send_to_user("parent-7", events::FEE_PAID, json!({"amount": 500}));
        assert_eq!(n, 2);
        assert_eq!(event_of(&mut tab1).unwrap()["data"]["amount"], 500);
        assert_eq!(event_of(&mut tab2).unwrap()["data"]["amount"], 500);
        assert!(event_of(&mut other).is_none());
    }

    #[test]
    fn offline_targets_deliver_zero() {
        let fx = Fixture::new();
        assert_eq!(fx.dispatcher.send_to_user("nobody", events::NOTIFICATION_NEW, json!({})), 0);
        assert_eq!(fx.dispatcher.send_to_tenant("school-0", events::EMERGENCY_ALERT, json!({})), 0);
        assert_eq!(fx.dispatcher.send_to_room("empty", events::MESSAGE_RECEIVED, json!({})), 0);
        assert_eq!(fx.dispatcher.broadcast_all(events::EMERGENCY_ALERT, json!({})), 0);
    }

    #[test]
    fn send_to_room_refuses_reserved_names() {
        let fx = Fixture::new();
        let _rx = fx.online("a", ident("u1", Role::Student, Some("s1")));
        assert_eq!(fx.dispatcher.send_to_room("user:u1", events::MESSAGE_RECEIVED, json!({})), 0);
    }

    #[test]
    fn ad_hoc_room_delivery() {
        let fx = Fixture::new();
        let mut a = fx.online("a", ident("u1", Role::Student, Some("s1")));
        let conn = fx.registry.lookup(&ConnectionId::from("a")).unwrap();
        let _ = fx.rooms.join(RoomKey::ad_hoc("class-5b").unwrap(), &conn);

        let n = fx.dispatcher.send_to_room("class-5b", events::HOMEWORK_ASSIGNED, json!({"subject": "math"}));
        assert_eq!(n, 1);
        assert_eq!(event_of(&mut a).unwrap()["event"], "homework:assigned");
    }

    #[test]
    fn broadcast_all_reaches_cross_tenant_roles() {
        let fx = Fixture::new();
        let mut root = fx.online("r", ident("root", Role::SuperAdmin, None));
        let mut s = fx.online("s", ident("u1", Role::Student, Some("s1")));
        assert_eq!(fx.dispatcher.broadcast_all(events::EMERGENCY_ALERT, json!({"level": "high"})), 2);
        assert!(event_of(&mut root).is_some());
        assert!(event_of(&mut s).is_some());
    }

    #[test]
    fn frames_are_envelopes() {
        let fx = Fixture::new();
        let mut a = fx.online("a", ident("u1", Role::Accountant, Some("s1")));
        let _ = fx.dispatcher.send_to_role(Role::Accountant, events::FEE_REMINDER, Value::Null);
        let v = event_of(&mut a).unwrap();
        assert_eq!(v, json!({"event": "fee:reminder", "data": null}));
    }
}
