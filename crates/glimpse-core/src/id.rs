//! Session and room identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RelayError;
use crate::validate;

/// Opaque identifier for a live connection.
///
/// Generated server-side on connect, unique for the process lifetime.
/// Safe to hand to clients for correlation (presenters address
/// approve/deny/ban/kick commands by session id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight characters, as stored in audit records.
    #[must_use]
    pub fn truncated(&self) -> String {
        let full = self.0.to_string();
        full.chars().take(8).collect()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A validated room identifier.
///
/// 1-64 characters from `[A-Za-z0-9_-]`. Construction is the only
/// validation point; a `RoomId` in hand is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Validate and wrap a raw room id.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRoomId`] when the id does not match
    /// `^[A-Za-z0-9_-]{1,64}$`.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        if validate::is_valid_room_id(raw) {
            Ok(Self(raw.to_owned()))
        } else {
            Err(RelayError::InvalidRoomId)
        }
    }

    /// The underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn truncated_session_id_is_eight_chars() {
        assert_eq!(SessionId::new().truncated().len(), 8);
    }

    #[test]
    fn room_id_accepts_valid() {
        assert!(RoomId::parse("team-standup_42").is_ok());
    }

    #[test]
    fn room_id_rejects_invalid() {
        assert!(RoomId::parse("").is_err());
        assert!(RoomId::parse("has space").is_err());
        assert!(RoomId::parse(&"x".repeat(65)).is_err());
    }
}
