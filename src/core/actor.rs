//! The identity of whoever is calling into the ledger.
//!
//! Authentication happens elsewhere; the ledger only needs the user id and
//! whether that user is an administrator.

use serde::{Deserialize, Serialize};

/// Access level of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A stylist logging their own records
    #[serde(alias = "user")]
    Stylist,
    /// Sees every stylist and may file records outside their cycle's range
    Admin,
}

/// User id and role supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Opaque user id
    pub user_id: String,
    /// Access level
    pub role: Role,
}

impl Actor {
    /// A stylist acting on their own records.
    #[must_use]
    pub fn stylist(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Stylist,
        }
    }

    /// An administrator.
    #[must_use]
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    /// Whether the actor has administrator rights.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the actor may modify a record owned by `owner_id`.
    #[must_use]
    pub fn can_modify(&self, owner_id: &str) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}
