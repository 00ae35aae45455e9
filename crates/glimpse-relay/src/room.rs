//! Room state.
//!
//! A room's mutable state lives behind one `std::sync::Mutex`; every
//! command against the room runs to completion under that lock, which
//! is what makes reads like `is_full` or the ban check linearizable.
//! The lock is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use bytes::Bytes;
use glimpse_core::{RoomId, SessionId};

/// An admitted viewer.
#[derive(Debug, Clone)]
pub(crate) struct ViewerRecord {
    pub(crate) username: String,
    pub(crate) joined_at: Instant,
}

/// A join request awaiting presenter approval.
#[derive(Debug, Clone)]
pub(crate) struct PendingRecord {
    pub(crate) username: String,
    pub(crate) requested_at: Instant,
}

/// Password/access-code gate for a protected room.
#[derive(Debug, Clone)]
pub(crate) struct RoomSecret {
    /// BCrypt hash, or a legacy `base64(sha256(salt || password))`.
    pub(crate) password_hash: String,
    /// Present only alongside a legacy hash.
    pub(crate) legacy_salt: Option<String>,
    pub(crate) access_code: String,
    pub(crate) access_code_expires_at: Instant,
}

impl RoomSecret {
    /// Whether `code` matches the current, unexpired access code.
    pub(crate) fn access_code_valid(&self, code: &str, now: Instant) -> bool {
        now < self.access_code_expires_at && self.access_code == code
    }
}

/// Mutable room state, guarded by [`Room::lock`].
#[derive(Debug)]
pub(crate) struct RoomState {
    pub(crate) presenter: SessionId,
    pub(crate) viewers: HashMap<SessionId, ViewerRecord>,
    pub(crate) pending: HashMap<SessionId, PendingRecord>,
    pub(crate) banned: HashSet<SessionId>,
    pub(crate) secret: Option<RoomSecret>,
    pub(crate) requires_approval: bool,
    pub(crate) max_viewers: usize,
    /// Most recent detected init segment, replaced wholesale.
    pub(crate) cached_init: Option<Bytes>,
    /// Set on teardown/reclaim; an in-flight join that still holds the
    /// instance must not admit into it.
    pub(crate) closed: bool,
    pub(crate) relayed_frames: u64,
    pub(crate) dropped_frames: u64,
}

impl RoomState {
    pub(crate) fn is_full(&self) -> bool {
        self.viewers.len() >= self.max_viewers
    }

    pub(crate) fn is_banned(&self, session_id: SessionId) -> bool {
        self.banned.contains(&session_id)
    }
}

/// A room: one presenter, many viewers, an optional admission gate.
#[derive(Debug)]
pub(crate) struct Room {
    pub(crate) id: RoomId,
    pub(crate) created_at: Instant,
    state: Mutex<RoomState>,
}

impl Room {
    pub(crate) fn new(
        id: RoomId,
        presenter: SessionId,
        max_viewers: usize,
        secret: Option<RoomSecret>,
    ) -> Self {
        let requires_approval = secret.is_some();
        Self {
            id,
            created_at: Instant::now(),
            state: Mutex::new(RoomState {
                presenter,
                viewers: HashMap::new(),
                pending: HashMap::new(),
                banned: HashSet::new(),
                secret,
                requires_approval,
                max_viewers,
                cached_init: None,
                closed: false,
                relayed_frames: 0,
                dropped_frames: 0,
            }),
        }
    }

    /// Take the room lock. A poisoned room mutex means a handler
    /// panicked mid-mutation; the state cannot be trusted.
    pub(crate) fn lock(&self) -> MutexGuard<'_, RoomState> {
        #[allow(clippy::expect_used)]
        self.state.lock().expect("room mutex poisoned")
    }

    /// Presenter session id without entering command context.
    pub(crate) fn presenter(&self) -> SessionId {
        self.lock().presenter
    }
}
