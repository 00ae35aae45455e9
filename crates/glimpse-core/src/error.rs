//! The stable error taxonomy shared across the relay.
//!
//! Wire codes are part of the protocol contract: clients dispatch on
//! the exact strings, so variants map to fixed codes and the mapping
//! never changes across releases.

use thiserror::Error;

use crate::protocol::ServerMessage;

/// Convenience result alias.
pub type RelayResult<T> = Result<T, RelayError>;

/// Stable wire error codes.
///
/// Ranges are reserved per category (`AUTH_001..009`, `ROOM_001..009`,
/// `RATE_001..003`, `VAL_001..004`, `SRV_001..003`); unlisted codes in
/// a range are currently unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ErrorCode {
    Auth001,
    Auth005,
    Room001,
    Room003,
    Room004,
    Room006,
    Room008,
    Room009,
    Rate001,
    Rate002,
    Val001,
    Val002,
    Val003,
    Val004,
    Srv001,
}

impl ErrorCode {
    /// The exact wire string for this code.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth001 => "AUTH_001",
            Self::Auth005 => "AUTH_005",
            Self::Room001 => "ROOM_001",
            Self::Room003 => "ROOM_003",
            Self::Room004 => "ROOM_004",
            Self::Room006 => "ROOM_006",
            Self::Room008 => "ROOM_008",
            Self::Room009 => "ROOM_009",
            Self::Rate001 => "RATE_001",
            Self::Rate002 => "RATE_002",
            Self::Val001 => "VAL_001",
            Self::Val002 => "VAL_002",
            Self::Val003 => "VAL_003",
            Self::Val004 => "VAL_004",
            Self::Srv001 => "SRV_001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced to a session as `error` frames.
///
/// Fatal variants additionally carry `action:"close"` on the wire and
/// terminate the connection; everything else is message-local.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// No bearer token in the connection handshake.
    #[error("authentication required")]
    MissingToken,

    /// Bearer token failed validation.
    #[error("invalid or expired token")]
    InvalidToken,

    /// The session's role does not permit this command.
    #[error("not permitted for this role")]
    NotPermitted,

    /// Target room does not exist.
    #[error("room not found")]
    RoomNotFound,

    /// Wrong password or access code.
    #[error("access to room denied")]
    AccessDenied,

    /// Room is at its viewer capacity.
    #[error("room is full")]
    RoomFull,

    /// The session id is banned from this room instance.
    #[error("banned from this room")]
    Banned,

    /// Room id failed validation.
    #[error("invalid room id")]
    InvalidRoomId,

    /// Per-IP room-creation window exhausted, or room caps reached.
    #[error("room creation limit reached")]
    RoomCreationLimit,

    /// Per-session message window exhausted.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Connection rejected because the remote IP is blocked.
    #[error("connection blocked")]
    IpBlocked,

    /// Unrecognized command type.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Unparseable text frame or missing required arguments.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Argument present but invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Binary payload exceeded the configured maximum.
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Observed payload size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Internal failure; details are logged, not sent to the client.
    #[error("internal error")]
    Internal(String),
}

impl RelayError {
    /// The stable wire code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            // Missing and invalid tokens share a frame per the
            // connection handshake contract.
            Self::MissingToken | Self::InvalidToken => ErrorCode::Auth001,
            Self::NotPermitted => ErrorCode::Auth005,
            Self::RoomNotFound => ErrorCode::Room001,
            Self::AccessDenied => ErrorCode::Room003,
            Self::RoomFull => ErrorCode::Room004,
            Self::Banned => ErrorCode::Room006,
            Self::InvalidRoomId => ErrorCode::Room008,
            Self::RoomCreationLimit => ErrorCode::Room009,
            Self::RateLimited => ErrorCode::Rate001,
            Self::IpBlocked => ErrorCode::Rate002,
            Self::UnknownCommand(_) => ErrorCode::Val001,
            Self::MalformedCommand(_) => ErrorCode::Val002,
            Self::InvalidArgument(_) => ErrorCode::Val003,
            Self::PayloadTooLarge { .. } => ErrorCode::Val004,
            Self::Internal(_) => ErrorCode::Srv001,
        }
    }

    /// Whether this error terminates the connection.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingToken | Self::InvalidToken | Self::IpBlocked
        )
    }

    /// Render as the wire `error` frame.
    #[must_use]
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            code: self.code().as_str().to_owned(),
            message: self.to_string(),
            action: self.is_fatal().then(|| "close".to_owned()),
        }
    }
}
