//! # campus-core
//!
//! Shared vocabulary for the campus event hub.
//!
//! - **Identity**: [`Identity`] claim set and the closed [`Role`] enumeration
//! - **Rooms**: [`RoomKey`] for derived (`user:`, `tenant:`, `role:`) and ad-hoc rooms
//! - **Branded IDs**: [`ConnectionId`] as a newtype for type safety
//! - **Wire format**: [`Envelope`] (`{ event, data }`) and domain event tags in [`events`]
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod envelope;
pub mod events;
pub mod identity;
pub mod ids;
pub mod logging;
pub mod rooms;

pub use envelope::Envelope;
pub use identity::{Identity, IdentityError, Role};
pub use ids::ConnectionId;
pub use rooms::RoomKey;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _id = ConnectionId::new();
        let _room = RoomKey::role(Role::Teacher);
        let _env = Envelope::new(events::FEE_PAID, serde_json::Value::Null);
    }
}
