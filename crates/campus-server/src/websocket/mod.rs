//! WebSocket hub: connection state, registry, rooms, dispatch, lifecycle,
//! heartbeat, and the per-connection session task.
//!
//! Data flow:
//! `session` accepts a socket → `lifecycle` verifies and activates it
//! (writing `registry` and `rooms`) → domain code calls `dispatcher` →
//! `rooms` enqueues on each member `connection` → the session's writer task
//! drains the queue.

pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod rooms;
pub mod session;
