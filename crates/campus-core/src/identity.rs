//! Verified identity of a connected client.
//!
//! An [`Identity`] is produced once per handshake from a verified credential
//! and is immutable afterwards. Its fields determine the derived rooms a
//! connection joins (see [`Identity::derived_rooms`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rooms::RoomKey;

/// Closed set of roles a subject can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Platform operator spanning every tenant.
    #[serde(alias = "super_admin")]
    SuperAdmin,
    /// Administrator of a single school.
    #[serde(alias = "school_admin")]
    SchoolAdmin,
    /// Teaching staff.
    Teacher,
    /// Enrolled student.
    Student,
    /// Parent or guardian.
    Parent,
    /// Fees and accounts staff.
    Accountant,
    /// Library staff.
    Librarian,
    /// Front-desk staff.
    Receptionist,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 8] = [
        Role::SuperAdmin,
        Role::SchoolAdmin,
        Role::Teacher,
        Role::Student,
        Role::Parent,
        Role::Accountant,
        Role::Librarian,
        Role::Receptionist,
    ];

    /// Wire name used in tokens and room keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super-admin",
            Role::SchoolAdmin => "school-admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Parent => "parent",
            Role::Accountant => "accountant",
            Role::Librarian => "librarian",
            Role::Receptionist => "receptionist",
        }
    }

    /// Whether this role may exist without a tenant.
    pub fn is_cross_tenant(self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == normalized)
            .ok_or_else(|| IdentityError::UnknownRole(s.to_owned()))
    }
}

/// Reasons a claim set cannot form an [`Identity`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Subject id was empty.
    #[error("subject id is empty")]
    EmptySubject,
    /// Role string is not one of the known roles.
    #[error("unknown role: {0}")]
    UnknownRole(String),
    /// A tenant-scoped role arrived without a tenant.
    #[error("role {0} requires a tenant id")]
    MissingTenant(Role),
}

/// Immutable claim set extracted from a verified credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    subject_id: String,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
}

impl Identity {
    /// Build an identity, enforcing that only cross-tenant roles omit a tenant.
    ///
    /// An empty tenant string is treated as absent.
    pub fn new(
        subject_id: impl Into<String>,
        role: Role,
        tenant_id: Option<String>,
    ) -> Result<Self, IdentityError> {
        let subject_id = subject_id.into();
        if subject_id.trim().is_empty() {
            return Err(IdentityError::EmptySubject);
        }
        let tenant_id = tenant_id.filter(|t| !t.trim().is_empty());
        if tenant_id.is_none() && !role.is_cross_tenant() {
            return Err(IdentityError::MissingTenant(role));
        }
        Ok(Self {
            subject_id,
            role,
            tenant_id,
        })
    }

    /// The addressable user.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// The subject's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The tenant (school), absent for cross-tenant roles.
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Rooms a connection with this identity joins at activation:
    /// `user:<sub>`, `tenant:<tenant>` when present, and `role:<role>`.
    pub fn derived_rooms(&self) -> Vec<RoomKey> {
        let mut rooms = Vec::with_capacity(3);
        rooms.push(RoomKey::user(&self.subject_id));
        if let Some(tenant) = &self.tenant_id {
            rooms.push(RoomKey::tenant(tenant));
        }
        rooms.push(RoomKey::role(self.role));
        rooms
    }
}
