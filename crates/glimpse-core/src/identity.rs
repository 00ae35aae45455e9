//! Authenticated identities and in-room roles.

use serde::{Deserialize, Serialize};

/// Account-level role carried by a validated bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular account.
    User,
    /// Administrative account.
    Admin,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// The identity extracted from a bearer token at session admission.
///
/// Immutable for the life of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account username.
    pub username: String,
    /// Account role.
    pub role: UserRole,
}

impl Identity {
    /// Construct an identity.
    #[must_use]
    pub fn new(username: impl Into<String>, role: UserRole) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }
}

/// A session's role within a room.
///
/// A session is in at most one room and holds exactly one of these
/// roles there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomRole {
    /// Not in any room.
    #[default]
    None,
    /// The single producer of binary frames for its room.
    Presenter,
    /// Admitted consumer of relayed frames.
    Viewer,
    /// Requested to join an approval-gated room, not yet admitted.
    PendingViewer,
}

impl RoomRole {
    /// Whether the session currently belongs to a room in any capacity.
    #[must_use]
    pub fn is_in_room(&self) -> bool {
        !matches!(self, Self::None)
    }
}
