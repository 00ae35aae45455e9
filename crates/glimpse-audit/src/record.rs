//! Audit record and event vocabulary.

use chrono::{DateTime, Utc};
use glimpse_core::SessionId;
use serde::{Deserialize, Serialize};

use crate::mask;

/// Record severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Denials and suspicious activity.
    Warn,
    /// Enforcement actions and failures.
    Error,
    /// Requires operator attention.
    Critical,
}

/// Every event type the relay emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    /// A connection authenticated successfully.
    SessionConnected,
    /// A session ended, for any reason.
    SessionDisconnected,
    /// A connection was refused because its IP is blocked.
    ConnectionBlocked,
    /// A bearer token failed validation.
    InvalidToken,
    /// A room was created.
    RoomCreated,
    /// A viewer was admitted to a room.
    RoomJoined,
    /// A session left its room voluntarily.
    RoomLeft,
    /// A room was destroyed.
    RoomDeleted,
    /// A join was rejected (password, code, ban, or capacity).
    RoomAccessDenied,
    /// The presenter admitted a pending viewer.
    ViewerApproved,
    /// The presenter rejected a pending viewer.
    ViewerDenied,
    /// The presenter removed a viewer.
    ViewerKicked,
    /// The presenter banned a viewer's session id.
    ViewerBanned,
    /// A session exceeded its message window.
    RateLimitExceeded,
    /// An IP was blocked after repeated auth failures or by an admin.
    IpBlocked,
    /// An IP block was lifted.
    IpUnblocked,
}

impl AuditEvent {
    /// Default severity for this event type.
    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::SessionConnected
            | Self::SessionDisconnected
            | Self::RoomCreated
            | Self::RoomJoined
            | Self::RoomLeft
            | Self::RoomDeleted
            | Self::ViewerApproved
            | Self::ViewerDenied
            | Self::IpUnblocked => Severity::Info,
            Self::ConnectionBlocked
            | Self::InvalidToken
            | Self::RoomAccessDenied
            | Self::ViewerKicked
            | Self::ViewerBanned
            | Self::RateLimitExceeded => Severity::Warn,
            Self::IpBlocked => Severity::Error,
        }
    }
}

/// One structured audit record.
///
/// `username` and `session_id` are stored masked/truncated; raw values
/// never enter a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// What happened.
    pub event_type: AuditEvent,
    /// Masked username, when an identity was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Truncated session id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Room involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Remote IP, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Free-form context.
    pub details: String,
    /// Record severity.
    pub severity: Severity,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Start a record with the event's default severity.
    #[must_use]
    pub fn new(event_type: AuditEvent) -> Self {
        Self {
            event_type,
            username: None,
            session_id: None,
            room_id: None,
            ip_address: None,
            details: String::new(),
            severity: event_type.severity(),
            created_at: Utc::now(),
        }
    }

    /// Attach a username; it is masked here.
    #[must_use]
    pub fn with_username(mut self, username: &str) -> Self {
        self.username = Some(mask::mask_username(username));
        self
    }

    /// Attach a session id; it is truncated here.
    #[must_use]
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id.truncated());
        self
    }

    /// Attach the room id.
    #[must_use]
    pub fn with_room_id(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    /// Attach the remote IP.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Attach free-form details.
    #[must_use]
    pub fn with_detail(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Override the default severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}
