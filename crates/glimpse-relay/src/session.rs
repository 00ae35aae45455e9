//! Live sessions and their outbound queues.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use glimpse_core::{Identity, RoomId, RoomRole, ServerMessage, SessionId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Capacity of every session's outbound queue, in frames.
///
/// This bound is the relay's only backpressure mechanism: a viewer
/// that cannot drain 1024 frames loses frames rather than stalling the
/// presenter or its peers.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// One frame queued for delivery to a session.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// A JSON text frame.
    Message(ServerMessage),
    /// An opaque media frame.
    Media(Bytes),
    /// Graceful-shutdown sentinel: the outbound loop flushes everything
    /// before it and then closes the connection.
    Close,
}

/// The session's place in the room topology.
#[derive(Debug, Clone, Default)]
struct Membership {
    room: Option<RoomId>,
    role: RoomRole,
}

/// A live connection as seen by the relay.
///
/// The connection task exclusively owns the socket; everything else
/// reaches the session through this handle and its bounded queue.
pub struct SessionHandle {
    /// Server-generated session id.
    pub id: SessionId,
    /// Authenticated identity, immutable for the session's life.
    pub identity: Identity,
    /// Remote IP.
    pub ip: String,
    outbound: mpsc::Sender<OutboundFrame>,
    membership: Mutex<Membership>,
    last_activity: Mutex<Instant>,
    cancel: CancellationToken,
}

impl SessionHandle {
    fn new(identity: Identity, ip: String) -> (Arc<Self>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let handle = Arc::new(Self {
            id: SessionId::new(),
            identity,
            ip,
            outbound: tx,
            membership: Mutex::new(Membership::default()),
            last_activity: Mutex::new(Instant::now()),
            cancel: CancellationToken::new(),
        });
        (handle, rx)
    }

    /// Non-blocking enqueue. Returns `false` when the frame was
    /// dropped because the queue is full or the receiver is gone.
    pub fn try_send(&self, frame: OutboundFrame) -> bool {
        match self.outbound.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                trace!(session_id = %self.id, error = %e, "outbound frame dropped");
                false
            }
        }
    }

    /// Enqueue a text frame.
    pub fn send_message(&self, message: ServerMessage) -> bool {
        self.try_send(OutboundFrame::Message(message))
    }

    /// Ask the connection to shut down gracefully.
    ///
    /// The close sentinel travels through the queue so frames enqueued
    /// before it (an `error` frame, say) still reach the wire. Only
    /// when the queue is too full to take the sentinel is the
    /// connection cancelled outright.
    pub fn close(&self) {
        if !self.try_send(OutboundFrame::Close) {
            self.cancel.cancel();
        }
    }

    /// Token the connection task watches for forced termination.
    #[must_use]
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current room and role.
    #[must_use]
    pub fn membership(&self) -> (Option<RoomId>, RoomRole) {
        self.membership
            .lock()
            .map(|m| (m.room.clone(), m.role))
            .unwrap_or((None, RoomRole::None))
    }

    /// Current room role.
    #[must_use]
    pub fn role(&self) -> RoomRole {
        self.membership
            .lock()
            .map(|m| m.role)
            .unwrap_or(RoomRole::None)
    }

    pub(crate) fn set_membership(&self, room: RoomId, role: RoomRole) {
        if let Ok(mut m) = self.membership.lock() {
            m.room = Some(room);
            m.role = role;
        }
    }

    pub(crate) fn clear_membership(&self) {
        if let Ok(mut m) = self.membership.lock() {
            m.room = None;
            m.role = RoomRole::None;
        }
    }

    /// Record inbound activity, for idle reaping.
    pub fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    /// Time since the last inbound activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .map_or(Duration::ZERO, |last| last.elapsed())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("username", &self.identity.username)
            .field("ip", &self.ip)
            .finish_non_exhaustive()
    }
}

/// Process-wide table of live sessions.
///
/// Rooms hold only session ids; handles are always resolved here, so
/// destroying a room never dangles a session reference.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
}

impl SessionTable {
    /// Allocate and register a session.
    pub fn create(
        &self,
        identity: Identity,
        ip: String,
    ) -> (Arc<SessionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (handle, rx) = SessionHandle::new(identity, ip);
        self.sessions.insert(handle.id, Arc::clone(&handle));
        (handle, rx)
    }

    /// Look up a live session.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|entry| Arc::clone(&entry))
    }

    /// Whether the session is still registered.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Deregister; the handle stays alive for in-flight references.
    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions idle for at least `cutoff`.
    #[must_use]
    pub fn idle_sessions(&self, cutoff: Duration) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|entry| entry.idle_for() >= cutoff)
            .map(|entry| entry.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_core::UserRole;

    fn identity() -> Identity {
        Identity::new("tester", UserRole::User)
    }

    #[tokio::test]
    async fn queue_drops_when_full() {
        let table = SessionTable::default();
        let (handle, mut rx) = table.create(identity(), "127.0.0.1".into());

        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            assert!(handle.try_send(OutboundFrame::Media(Bytes::from_static(b"x"))));
        }
        // Queue full: the next frame is dropped, nothing blocks.
        assert!(!handle.try_send(OutboundFrame::Media(Bytes::from_static(b"y"))));

        // Draining one slot admits exactly one more frame.
        rx.recv().await.unwrap();
        assert!(handle.try_send(OutboundFrame::Media(Bytes::from_static(b"z"))));
    }

    #[test]
    fn membership_is_single_slot() {
        let table = SessionTable::default();
        let (handle, _rx) = table.create(identity(), "127.0.0.1".into());

        assert_eq!(handle.membership(), (None, RoomRole::None));
        let room = RoomId::parse("demo").unwrap();
        handle.set_membership(room.clone(), RoomRole::Viewer);
        assert_eq!(handle.membership(), (Some(room), RoomRole::Viewer));
        handle.clear_membership();
        assert_eq!(handle.membership(), (None, RoomRole::None));
    }

    #[test]
    fn removed_sessions_are_gone() {
        let table = SessionTable::default();
        let (handle, _rx) = table.create(identity(), "127.0.0.1".into());
        assert!(table.contains(handle.id));
        table.remove(handle.id);
        assert!(!table.contains(handle.id));
        assert!(table.is_empty());
    }
}
