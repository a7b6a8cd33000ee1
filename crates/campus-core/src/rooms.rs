//! Room keys.
//!
//! Derived rooms use the reserved prefixes `user:`, `tenant:` and `role:`.
//! Ad-hoc rooms are any other name a client asks to join; they can never
//! collide with a derived room because [`RoomKey::ad_hoc`] refuses reserved
//! prefixes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::Role;

/// Prefix of per-subject rooms.
pub const USER_PREFIX: &str = "user:";
/// Prefix of per-tenant rooms.
pub const TENANT_PREFIX: &str = "tenant:";
/// Prefix of per-role rooms.
pub const ROLE_PREFIX: &str = "role:";

/// Longest accepted ad-hoc room name, in bytes.
pub const MAX_AD_HOC_LEN: usize = 128;

const RESERVED_PREFIXES: [&str; 3] = [USER_PREFIX, TENANT_PREFIX, ROLE_PREFIX];

/// Name of a subscription group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    /// `user:<subject_id>`
    pub fn user(subject_id: &str) -> Self {
        Self(format!("{USER_PREFIX}{subject_id}"))
    }

    /// `tenant:<tenant_id>`
    pub fn tenant(tenant_id: &str) -> Self {
        Self(format!("{TENANT_PREFIX}{tenant_id}"))
    }

    /// `role:<role>`
    pub fn role(role: Role) -> Self {
        Self(format!("{ROLE_PREFIX}{role}"))
    }

    /// Validate a client-chosen room name.
    ///
    /// Returns `None` for empty names, names longer than
    /// [`MAX_AD_HOC_LEN`], names containing control characters, and names
    /// using a reserved prefix.
    pub fn ad_hoc(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_AD_HOC_LEN {
            return None;
        }
        if name.chars().any(char::is_control) {
            return None;
        }
        if RESERVED_PREFIXES.iter().any(|p| name.starts_with(p)) {
            return None;
        }
        Some(Self(name.to_owned()))
    }

    /// Whether this key is one of the identity-derived rooms.
    pub fn is_derived(&self) -> bool {
        RESERVED_PREFIXES.iter().any(|p| self.0.starts_with(p))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for RoomKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
