//! The JSON text-frame protocol.
//!
//! A frame is either text (UTF-8 JSON, one object with a required
//! `type` field) or binary (opaque media, handled by the fan-out
//! engine). Type tags are kebab-case, field names camelCase.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;
use crate::id::SessionId;

/// Commands a client may issue on its text channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Create a room and become its presenter.
    CreateRoom {
        /// Requested room id.
        room_id: String,
        /// Optional room password (4-128 chars).
        #[serde(default)]
        password: Option<String>,
        /// Optional viewer cap, clamped to `[1, 100]`.
        #[serde(default)]
        max_viewers: Option<u32>,
    },
    /// Join an existing room as a viewer.
    JoinRoom {
        /// Target room id.
        room_id: String,
        /// Password, for password-protected rooms.
        #[serde(default)]
        password: Option<String>,
        /// Access code, as an alternative to the password.
        #[serde(default)]
        access_code: Option<String>,
    },
    /// Leave the current room.
    LeaveRoom,
    /// Ask for the current viewer count of the session's room.
    GetViewerCount,
    /// Presenter only: admit a pending viewer.
    ApproveViewer {
        /// Session id of the pending viewer.
        viewer_session_id: SessionId,
    },
    /// Presenter only: reject a pending viewer.
    DenyViewer {
        /// Session id of the pending viewer.
        viewer_session_id: SessionId,
    },
    /// Presenter only: remove a viewer and bar its session id from
    /// rejoining this room instance.
    BanViewer {
        /// Session id of the viewer.
        viewer_session_id: SessionId,
    },
    /// Presenter only: remove a viewer; it may rejoin.
    KickViewer {
        /// Session id of the viewer.
        viewer_session_id: SessionId,
    },
}

/// All command type tags, used to distinguish unknown commands from
/// malformed known ones.
const COMMAND_TAGS: &[&str] = &[
    "create-room",
    "join-room",
    "leave-room",
    "get-viewer-count",
    "approve-viewer",
    "deny-viewer",
    "ban-viewer",
    "kick-viewer",
];

impl ClientCommand {
    /// Parse a raw text frame.
    ///
    /// # Errors
    ///
    /// - [`RelayError::MalformedCommand`] for invalid JSON, a missing
    ///   `type` field, or missing/mistyped arguments.
    /// - [`RelayError::UnknownCommand`] for a well-formed object whose
    ///   `type` is not a recognized command.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| RelayError::MalformedCommand(e.to_string()))?;
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| RelayError::MalformedCommand("missing `type` field".to_owned()))?;
        if !COMMAND_TAGS.contains(&tag) {
            return Err(RelayError::UnknownCommand(tag.to_owned()));
        }
        serde_json::from_value(value).map_err(|e| RelayError::MalformedCommand(e.to_string()))
    }
}

/// Frames the server sends on a session's text channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Greeting after successful authentication.
    Connected {
        /// The allocated session id.
        session_id: SessionId,
        /// Authenticated username.
        username: String,
        /// Human-readable greeting.
        message: String,
        /// Always `"pending"`: the session has no room yet.
        role: String,
    },
    /// Reply to `create-room`.
    RoomCreated {
        /// Final room id (may differ from the requested one).
        room_id: String,
        /// Always `"presenter"`.
        role: String,
        /// Whether a password gate is set.
        password_protected: bool,
        /// Whether joins queue for presenter approval.
        requires_approval: bool,
        /// Shareable access code, present iff password-protected.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_code: Option<String>,
    },
    /// The session was admitted to a room as a viewer.
    RoomJoined {
        /// Room id.
        room_id: String,
        /// Always `"viewer"`.
        role: String,
        /// Viewer count including the new viewer.
        viewer_count: usize,
    },
    /// The join request is queued for presenter approval.
    WaitingApproval {
        /// Room id.
        room_id: String,
        /// Human-readable status.
        message: String,
    },
    /// Reply to `leave-room`.
    RoomLeft {
        /// Human-readable status.
        message: String,
    },
    /// Current viewer count, sent on request and on membership changes.
    ViewerCount {
        /// Number of admitted viewers.
        count: usize,
    },
    /// Notifies the presenter that a viewer awaits approval.
    ViewerRequest {
        /// Session id of the requester.
        viewer_session_id: SessionId,
        /// Username of the requester.
        viewer_username: String,
        /// Pending queue length including this request.
        pending_count: usize,
    },
    /// Confirmation to the presenter after `approve-viewer`.
    ViewerApproved {
        /// Session id of the approved viewer.
        viewer_session_id: SessionId,
        /// Remaining pending queue length.
        pending_count: usize,
    },
    /// Confirmation to the presenter after `deny-viewer`.
    ViewerDenied {
        /// Session id of the denied viewer.
        viewer_session_id: SessionId,
        /// Remaining pending queue length.
        pending_count: usize,
    },
    /// Confirmation to the presenter after `kick-viewer`.
    ViewerKicked {
        /// Session id of the kicked viewer.
        viewer_session_id: SessionId,
        /// Viewer count after removal.
        viewer_count: usize,
    },
    /// Confirmation to the presenter after `ban-viewer`.
    ViewerBanned {
        /// Session id of the banned viewer.
        viewer_session_id: SessionId,
        /// Viewer count after removal.
        viewer_count: usize,
    },
    /// Sent to a viewer removed by `kick-viewer`.
    Kicked {
        /// Human-readable reason.
        message: String,
    },
    /// Sent to a viewer removed by `ban-viewer`.
    Banned {
        /// Human-readable reason.
        message: String,
    },
    /// Sent to a pending viewer rejected by `deny-viewer`.
    AccessDenied {
        /// Human-readable reason.
        message: String,
    },
    /// Sent to every viewer when the presenter leaves; the room is gone.
    PresenterLeft {
        /// Human-readable reason.
        message: String,
    },
    /// An error frame; `action:"close"` marks connection-fatal errors.
    Error {
        /// Stable error code.
        code: String,
        /// Human-readable description.
        message: String,
        /// `"close"` when the connection will be terminated.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_room() {
        let cmd = ClientCommand::parse(
            r#"{"type":"create-room","roomId":"demo","password":"s3cret!!","maxViewers":10}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            ClientCommand::CreateRoom {
                room_id: "demo".into(),
                password: Some("s3cret!!".into()),
                max_viewers: Some(10),
            }
        );
    }

    #[test]
    fn parses_bare_leave() {
        let cmd = ClientCommand::parse(r#"{"type":"leave-room"}"#).unwrap();
        assert_eq!(cmd, ClientCommand::LeaveRoom);
    }

    #[test]
    fn unknown_type_is_distinguished() {
        let err = ClientCommand::parse(r#"{"type":"start-recording"}"#).unwrap_err();
        assert!(matches!(err, RelayError::UnknownCommand(t) if t == "start-recording"));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = ClientCommand::parse("{nope").unwrap_err();
        assert!(matches!(err, RelayError::MalformedCommand(_)));
    }

    #[test]
    fn missing_args_are_malformed() {
        let err = ClientCommand::parse(r#"{"type":"join-room"}"#).unwrap_err();
        assert!(matches!(err, RelayError::MalformedCommand(_)));
    }

    #[test]
    fn server_frames_use_camel_case_fields() {
        let frame = ServerMessage::RoomJoined {
            room_id: "demo".into(),
            role: "viewer".into(),
            viewer_count: 3,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "room-joined");
        assert_eq!(json["roomId"], "demo");
        assert_eq!(json["viewerCount"], 3);
    }

    #[test]
    fn absent_access_code_is_omitted() {
        let frame = ServerMessage::RoomCreated {
            room_id: "demo".into(),
            role: "presenter".into(),
            password_protected: false,
            requires_approval: false,
            access_code: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("accessCode").is_none());
    }
}
