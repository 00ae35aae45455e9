//! The relay engine: command dispatch, room transitions, fan-out.
//!
//! Connection tasks call into the engine; the engine mutates room
//! state under per-room mutexes and reaches other sessions only
//! through their bounded outbound queues. Room locks are scoped to
//! synchronous blocks; audit delivery and password hashing happen
//! outside them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use glimpse_audit::{AuditEvent, AuditRecord, AuditSink};
use glimpse_auth::credentials;
use glimpse_core::{
    ClientCommand, Identity, RelayError, RoomId, RoomRole, ServerMessage, SessionId, validate,
};
use glimpse_limits::{IpThrottle, RateLimiter};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::media;
use crate::registry::{CreateOutcome, RoomRegistry};
use crate::room::{PendingRecord, Room, RoomSecret, ViewerRecord};
use crate::session::{OutboundFrame, SessionHandle, SessionTable};

/// Engine tunables, mapped from the deployment configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Largest accepted binary payload, bytes.
    pub max_binary_payload: usize,
    /// Per-room viewer cap; hard ceiling 100.
    pub max_viewers_per_room: usize,
    /// Cap on concurrently existing rooms.
    pub max_rooms: usize,
    /// Rooms one user may present concurrently.
    pub max_rooms_per_user: usize,
    /// Access-code lifetime.
    pub access_code_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_binary_payload: 10 * 1024 * 1024,
            max_viewers_per_room: 100,
            max_rooms: 500,
            max_rooms_per_user: 5,
            access_code_ttl: credentials::ACCESS_CODE_TTL,
        }
    }
}

/// Why a session is being detached from its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetachKind {
    /// Explicit `leave-room`.
    Voluntary,
    /// Connection teardown.
    Disconnect,
    /// Implicit leave because the session is entering another room.
    Switching,
}

/// The room-and-session relay engine.
pub struct RelayEngine {
    config: EngineConfig,
    sessions: SessionTable,
    rooms: RoomRegistry,
    limiter: Arc<RateLimiter>,
    throttle: Arc<IpThrottle>,
    audit: Arc<dyn AuditSink>,
}

impl RelayEngine {
    /// Wire up the engine with its injected capabilities.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        limiter: Arc<RateLimiter>,
        throttle: Arc<IpThrottle>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            sessions: SessionTable::default(),
            rooms: RoomRegistry::default(),
            limiter,
            throttle,
            audit,
        }
    }

    /// The live-session table.
    #[must_use]
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// The IP throttle, shared with the admission path.
    #[must_use]
    pub fn throttle(&self) -> &Arc<IpThrottle> {
        &self.throttle
    }

    /// The audit sink, shared with the admission path.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Register an authenticated connection: allocate the session and
    /// its outbound queue, greet it, and audit the admission.
    pub async fn register_session(
        &self,
        identity: Identity,
        ip: String,
    ) -> (Arc<SessionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (session, rx) = self.sessions.create(identity, ip);
        session.send_message(ServerMessage::Connected {
            session_id: session.id,
            username: session.identity.username.clone(),
            message: "connected to relay".to_owned(),
            role: "pending".to_owned(),
        });
        self.audit
            .record(
                AuditRecord::new(AuditEvent::SessionConnected)
                    .with_username(&session.identity.username)
                    .with_session_id(session.id)
                    .with_ip(session.ip.clone())
                    .with_detail("session registered"),
            )
            .await;
        info!(session_id = %session.id, username = %session.identity.username, "session connected");
        (session, rx)
    }

    /// Handle one inbound text frame: rate limit, parse, dispatch.
    ///
    /// # Errors
    ///
    /// Message-local [`RelayError`]s; the caller renders them as error
    /// frames and keeps the connection open.
    pub async fn handle_text(
        &self,
        session: &Arc<SessionHandle>,
        raw: &str,
    ) -> Result<(), RelayError> {
        session.touch();
        if self.limiter.check_message(session.id).is_err() {
            self.audit
                .record(
                    AuditRecord::new(AuditEvent::RateLimitExceeded)
                        .with_username(&session.identity.username)
                        .with_session_id(session.id)
                        .with_ip(session.ip.clone())
                        .with_detail("per-session message window exhausted"),
                )
                .await;
            return Err(RelayError::RateLimited);
        }
        let command = ClientCommand::parse(raw)?;
        trace!(session_id = %session.id, ?command, "dispatching command");
        match command {
            ClientCommand::CreateRoom {
                room_id,
                password,
                max_viewers,
            } => self.create_room(session, &room_id, password, max_viewers).await,
            ClientCommand::JoinRoom {
                room_id,
                password,
                access_code,
            } => self.join_room(session, &room_id, password, access_code).await,
            ClientCommand::LeaveRoom => self.leave_room(session).await,
            ClientCommand::GetViewerCount => self.get_viewer_count(session),
            ClientCommand::ApproveViewer { viewer_session_id } => {
                self.approve_viewer(session, viewer_session_id).await
            }
            ClientCommand::DenyViewer { viewer_session_id } => {
                self.deny_viewer(session, viewer_session_id).await
            }
            ClientCommand::BanViewer { viewer_session_id } => {
                self.ban_viewer(session, viewer_session_id).await
            }
            ClientCommand::KickViewer { viewer_session_id } => {
                self.kick_viewer(session, viewer_session_id).await
            }
        }
    }

    /// Handle one inbound binary frame from `session`.
    ///
    /// Oversized payloads are an error; frames from anyone but a
    /// presenter of a live room are silently dropped.
    ///
    /// # Errors
    ///
    /// [`RelayError::PayloadTooLarge`] only.
    pub fn handle_binary(
        &self,
        session: &Arc<SessionHandle>,
        payload: Bytes,
    ) -> Result<(), RelayError> {
        session.touch();
        if !validate::is_valid_payload_size(payload.len(), self.config.max_binary_payload) {
            return Err(RelayError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_binary_payload,
            });
        }
        let (room_id, role) = session.membership();
        let (Some(room_id), RoomRole::Presenter) = (room_id, role) else {
            trace!(session_id = %session.id, "dropping binary frame from non-presenter");
            return Ok(());
        };
        let Some(room) = self.rooms.get(&room_id) else {
            trace!(session_id = %session.id, room_id = %room_id, "dropping binary frame for missing room");
            return Ok(());
        };

        let mut state = room.lock();
        if state.presenter != session.id {
            trace!(session_id = %session.id, room_id = %room_id, "dropping binary frame from stale presenter");
            return Ok(());
        }
        // Cache before relaying so a concurrent joiner can never see a
        // relayed init segment that the cache does not have yet.
        if media::is_init_segment(&payload) {
            debug!(room_id = %room_id, size = payload.len(), "caching init segment");
            state.cached_init = Some(payload.clone());
        }
        let mut dropped = 0u64;
        for viewer_id in state.viewers.keys() {
            let delivered = self
                .sessions
                .get(*viewer_id)
                .is_some_and(|viewer| viewer.try_send(OutboundFrame::Media(payload.clone())));
            if !delivered {
                dropped += 1;
            }
        }
        state.relayed_frames += 1;
        state.dropped_frames += dropped;
        Ok(())
    }

    /// Admin entry point: block an IP in cache and durable store.
    ///
    /// Consumed by the external admin surface; the relay itself only
    /// blocks IPs through the failed-auth escalation.
    pub async fn block_ip(&self, ip: &str, duration: Duration, reason: &str) {
        let block = self.throttle.block_ip(ip, duration, reason).await;
        self.audit
            .record(
                AuditRecord::new(AuditEvent::IpBlocked)
                    .with_ip(block.ip.clone())
                    .with_detail(block.reason.clone()),
            )
            .await;
    }

    /// Admin entry point: lift an IP block from both layers.
    pub async fn unblock_ip(&self, ip: &str) {
        self.throttle.unblock_ip(ip).await;
        self.audit
            .record(
                AuditRecord::new(AuditEvent::IpUnblocked)
                    .with_ip(ip.to_owned())
                    .with_detail("block lifted by administrator"),
            )
            .await;
    }

    /// Tear down a session: detach it from its room, drop its queue
    /// registration and rate-limit state, audit the disconnect.
    pub async fn disconnect(&self, session_id: SessionId) {
        let Some(session) = self.sessions.remove(session_id) else {
            return;
        };
        self.detach(&session, DetachKind::Disconnect).await;
        self.limiter.release_session(session_id);
        self.audit
            .record(
                AuditRecord::new(AuditEvent::SessionDisconnected)
                    .with_username(&session.identity.username)
                    .with_session_id(session_id)
                    .with_ip(session.ip.clone())
                    .with_detail("session closed"),
            )
            .await;
        info!(session_id = %session_id, "session disconnected");
    }

    // ---- create-room ----------------------------------------------------

    async fn create_room(
        &self,
        session: &Arc<SessionHandle>,
        room_id_raw: &str,
        password: Option<String>,
        max_viewers: Option<u32>,
    ) -> Result<(), RelayError> {
        let room_id = RoomId::parse(room_id_raw)?;
        if let Some(password) = &password {
            if !validate::is_valid_room_password(password) {
                return Err(RelayError::InvalidArgument(
                    "password must be 4-128 characters".to_owned(),
                ));
            }
        }
        self.limiter.check_room_creation(&session.ip)?;
        if self.rooms.len() >= self.config.max_rooms {
            warn!(max_rooms = self.config.max_rooms, "room cap reached");
            return Err(RelayError::RoomCreationLimit);
        }
        if self
            .rooms
            .count_presented_by(&session.identity.username, &self.sessions)
            >= self.config.max_rooms_per_user
        {
            return Err(RelayError::RoomCreationLimit);
        }

        // bcrypt at cost 12 is deliberately slow; keep it off the
        // async workers and away from any room lock.
        let secret = match password {
            Some(password) => {
                let hash = tokio::task::spawn_blocking(move || {
                    credentials::hash_password(&password)
                })
                .await
                .map_err(|e| RelayError::Internal(e.to_string()))?
                .map_err(|e| RelayError::Internal(e.to_string()))?;
                Some(RoomSecret {
                    password_hash: hash,
                    legacy_salt: None,
                    access_code: credentials::generate_access_code(),
                    access_code_expires_at: Instant::now() + self.config.access_code_ttl,
                })
            }
            None => None,
        };

        if session.role().is_in_room() {
            self.detach(session, DetachKind::Switching).await;
        }

        let max_viewers = max_viewers.map_or(self.config.max_viewers_per_room, |requested| {
            usize::try_from(requested)
                .unwrap_or(self.config.max_viewers_per_room)
                .clamp(1, self.config.max_viewers_per_room)
        });

        let (room, reclaimed) = self.place_room(&room_id, session, max_viewers, secret.clone())?;
        if let Some(old) = reclaimed {
            self.audit
                .record(
                    AuditRecord::new(AuditEvent::RoomDeleted)
                        .with_room_id(old.id.as_str())
                        .with_detail("stale room reclaimed"),
                )
                .await;
        }

        session.set_membership(room.id.clone(), RoomRole::Presenter);
        session.send_message(ServerMessage::RoomCreated {
            room_id: room.id.as_str().to_owned(),
            role: "presenter".to_owned(),
            password_protected: secret.is_some(),
            requires_approval: secret.is_some(),
            access_code: secret.map(|s| s.access_code),
        });
        self.audit
            .record(
                AuditRecord::new(AuditEvent::RoomCreated)
                    .with_username(&session.identity.username)
                    .with_session_id(session.id)
                    .with_room_id(room.id.as_str())
                    .with_ip(session.ip.clone())
                    .with_detail(format!("max viewers {max_viewers}")),
            )
            .await;
        info!(room_id = %room.id, presenter = %session.id, "room created");
        Ok(())
    }

    /// Register a new room, forking the id once if it is held by a
    /// live presenter. Returns the room and the stale instance it
    /// replaced, if any.
    fn place_room(
        &self,
        room_id: &RoomId,
        session: &Arc<SessionHandle>,
        max_viewers: usize,
        secret: Option<RoomSecret>,
    ) -> Result<(Arc<Room>, Option<Arc<Room>>), RelayError> {
        let build = |id: RoomId| Arc::new(Room::new(id, session.id, max_viewers, secret.clone()));

        let room = build(room_id.clone());
        match self.rooms.try_insert(Arc::clone(&room), &self.sessions, |old| {
            let _ = Self::evacuate_locked(old, &self.sessions);
        }) {
            CreateOutcome::Inserted => Ok((room, None)),
            CreateOutcome::Reclaimed(old) => Ok((room, Some(old))),
            CreateOutcome::Held => {
                // Fork: keep room under the 64-char id limit, suffix
                // with 4 random hex chars, and retry exactly once.
                let base: String = room_id.as_str().chars().take(59).collect();
                let forked_raw = format!("{base}-{}", credentials::random_hex_suffix());
                let forked_id = RoomId::parse(&forked_raw)
                    .map_err(|_| RelayError::Internal("forked room id invalid".to_owned()))?;
                debug!(requested = %room_id, forked = %forked_id, "room id held, forking");
                let forked = build(forked_id);
                match self
                    .rooms
                    .try_insert(Arc::clone(&forked), &self.sessions, |old| {
                        let _ = Self::evacuate_locked(old, &self.sessions);
                    }) {
                    CreateOutcome::Inserted => Ok((forked, None)),
                    CreateOutcome::Reclaimed(old) => Ok((forked, Some(old))),
                    CreateOutcome::Held => {
                        Err(RelayError::Internal("forked room id collision".to_owned()))
                    }
                }
            }
        }
    }

    /// Close a room and detach every member. Marks the instance closed
    /// so an in-flight join cannot admit into it afterwards. Returns
    /// the relayed/dropped frame counters.
    fn evacuate_locked(room: &Arc<Room>, sessions: &SessionTable) -> (u64, u64) {
        let (members, stats) = {
            let mut state = room.lock();
            state.closed = true;
            let members: Vec<SessionId> = state
                .viewers
                .keys()
                .chain(state.pending.keys())
                .copied()
                .collect();
            state.viewers.clear();
            state.pending.clear();
            state.cached_init = None;
            (members, (state.relayed_frames, state.dropped_frames))
        };

        for member_id in members {
            if let Some(member) = sessions.get(member_id) {
                member.clear_membership();
                member.send_message(ServerMessage::PresenterLeft {
                    message: "the presenter has left".to_owned(),
                });
            }
        }
        stats
    }

    // ---- join-room ------------------------------------------------------

    async fn join_room(
        &self,
        session: &Arc<SessionHandle>,
        room_id_raw: &str,
        password: Option<String>,
        access_code: Option<String>,
    ) -> Result<(), RelayError> {
        let room_id = RoomId::parse(room_id_raw)?;
        if session.role().is_in_room() {
            self.detach(session, DetachKind::Switching).await;
        }
        let room = self.rooms.get(&room_id).ok_or(RelayError::RoomNotFound)?;

        // First pass: admission checks that need no hashing, plus a
        // snapshot of the gate for the slow password path.
        let gate = {
            let state = room.lock();
            if state.is_banned(session.id) {
                Err(RelayError::Banned)
            } else if state.is_full() {
                Err(RelayError::RoomFull)
            } else {
                Ok(state.secret.clone())
            }
        };
        let gate = match gate {
            Err(RelayError::Banned) => {
                self.audit_access_denied(session, &room_id, "banned session id").await;
                return Err(RelayError::Banned);
            }
            Err(other) => return Err(other),
            Ok(secret) => secret,
        };

        if let Some(secret) = gate {
            let code_ok = access_code
                .as_deref()
                .is_some_and(|code| secret.access_code_valid(code, Instant::now()));
            let password_ok = if code_ok {
                true
            } else if let Some(password) = password {
                // BCrypt verification is as slow as hashing; run it
                // off the async workers, without any lock held.
                let hash = secret.password_hash.clone();
                let salt = secret.legacy_salt.clone();
                tokio::task::spawn_blocking(move || {
                    credentials::verify_password(&password, &hash, salt.as_deref())
                })
                .await
                .map_err(|e| RelayError::Internal(e.to_string()))?
            } else {
                false
            };
            if !password_ok {
                self.audit_access_denied(session, &room_id, "bad password or access code")
                    .await;
                return Err(RelayError::AccessDenied);
            }
        }

        // Second pass: admit under the room lock, re-checking what may
        // have changed while the password was being verified.
        let admitted = {
            let mut state = room.lock();
            if state.closed {
                return Err(RelayError::RoomNotFound);
            }
            if state.is_banned(session.id) {
                return Err(RelayError::Banned);
            }
            if state.is_full() {
                return Err(RelayError::RoomFull);
            }
            if state.requires_approval {
                state.pending.insert(
                    session.id,
                    PendingRecord {
                        username: session.identity.username.clone(),
                        requested_at: Instant::now(),
                    },
                );
                session.set_membership(room.id.clone(), RoomRole::PendingViewer);
                session.send_message(ServerMessage::WaitingApproval {
                    room_id: room.id.as_str().to_owned(),
                    message: "waiting for the presenter to approve you".to_owned(),
                });
                if let Some(presenter) = self.sessions.get(state.presenter) {
                    presenter.send_message(ServerMessage::ViewerRequest {
                        viewer_session_id: session.id,
                        viewer_username: session.identity.username.clone(),
                        pending_count: state.pending.len(),
                    });
                }
                false
            } else {
                Self::admit_viewer_locked(&mut state, &room, session, &self.sessions);
                true
            }
        };

        if admitted {
            self.audit
                .record(
                    AuditRecord::new(AuditEvent::RoomJoined)
                        .with_username(&session.identity.username)
                        .with_session_id(session.id)
                        .with_room_id(room.id.as_str())
                        .with_ip(session.ip.clone())
                        .with_detail("viewer joined"),
                )
                .await;
            info!(room_id = %room.id, viewer = %session.id, "viewer joined");
        }
        Ok(())
    }

    /// The viewer join sequence. Caller holds the room lock; the
    /// ordering below is what guarantees a late joiner decodes:
    /// `room-joined`, then the cached init segment, before any relayed
    /// frame can be enqueued for this viewer.
    fn admit_viewer_locked(
        state: &mut crate::room::RoomState,
        room: &Arc<Room>,
        session: &Arc<SessionHandle>,
        sessions: &SessionTable,
    ) {
        state.pending.remove(&session.id);
        state.viewers.insert(
            session.id,
            ViewerRecord {
                username: session.identity.username.clone(),
                joined_at: Instant::now(),
            },
        );
        session.set_membership(room.id.clone(), RoomRole::Viewer);
        session.send_message(ServerMessage::RoomJoined {
            room_id: room.id.as_str().to_owned(),
            role: "viewer".to_owned(),
            viewer_count: state.viewers.len(),
        });
        if let Some(init) = &state.cached_init {
            session.try_send(OutboundFrame::Media(init.clone()));
        }
        if let Some(presenter) = sessions.get(state.presenter) {
            presenter.send_message(ServerMessage::ViewerCount {
                count: state.viewers.len(),
            });
        }
    }

    async fn audit_access_denied(
        &self,
        session: &Arc<SessionHandle>,
        room_id: &RoomId,
        detail: &str,
    ) {
        self.audit
            .record(
                AuditRecord::new(AuditEvent::RoomAccessDenied)
                    .with_username(&session.identity.username)
                    .with_session_id(session.id)
                    .with_room_id(room_id.as_str())
                    .with_ip(session.ip.clone())
                    .with_detail(detail),
            )
            .await;
    }

    // ---- leave / viewer count -------------------------------------------

    async fn leave_room(&self, session: &Arc<SessionHandle>) -> Result<(), RelayError> {
        if !session.role().is_in_room() {
            return Err(RelayError::NotPermitted);
        }
        self.detach(session, DetachKind::Voluntary).await;
        session.send_message(ServerMessage::RoomLeft {
            message: "you left the room".to_owned(),
        });
        Ok(())
    }

    fn get_viewer_count(&self, session: &Arc<SessionHandle>) -> Result<(), RelayError> {
        let (room_id, role) = session.membership();
        let Some(room_id) = room_id else {
            return Err(RelayError::NotPermitted);
        };
        if !role.is_in_room() {
            return Err(RelayError::NotPermitted);
        }
        let room = self.rooms.get(&room_id).ok_or(RelayError::RoomNotFound)?;
        let count = room.lock().viewers.len();
        session.send_message(ServerMessage::ViewerCount { count });
        Ok(())
    }

    // ---- presenter moderation -------------------------------------------

    /// Resolve the room the presenter `session` controls.
    fn presenter_room(&self, session: &Arc<SessionHandle>) -> Result<Arc<Room>, RelayError> {
        let (room_id, role) = session.membership();
        if role != RoomRole::Presenter {
            return Err(RelayError::NotPermitted);
        }
        let room_id = room_id.ok_or(RelayError::NotPermitted)?;
        let room = self.rooms.get(&room_id).ok_or(RelayError::RoomNotFound)?;
        if room.presenter() != session.id {
            return Err(RelayError::NotPermitted);
        }
        Ok(room)
    }

    async fn approve_viewer(
        &self,
        session: &Arc<SessionHandle>,
        viewer_session_id: SessionId,
    ) -> Result<(), RelayError> {
        let room = self.presenter_room(session)?;
        let waited = {
            let mut state = room.lock();
            if state.is_full() {
                // The pending entry survives; the presenter can make
                // space and approve again.
                return Err(RelayError::RoomFull);
            }
            let Some(pending) = state.pending.remove(&viewer_session_id) else {
                return Err(RelayError::InvalidArgument(
                    "viewer is not awaiting approval".to_owned(),
                ));
            };
            if let Some(viewer) = self.sessions.get(viewer_session_id) {
                Self::admit_viewer_locked(&mut state, &room, &viewer, &self.sessions);
            }
            session.send_message(ServerMessage::ViewerApproved {
                viewer_session_id,
                pending_count: state.pending.len(),
            });
            pending.requested_at.elapsed()
        };
        self.audit
            .record(
                AuditRecord::new(AuditEvent::ViewerApproved)
                    .with_username(&session.identity.username)
                    .with_session_id(viewer_session_id)
                    .with_room_id(room.id.as_str())
                    .with_detail(format!("approved after {}s", waited.as_secs())),
            )
            .await;
        Ok(())
    }

    async fn deny_viewer(
        &self,
        session: &Arc<SessionHandle>,
        viewer_session_id: SessionId,
    ) -> Result<(), RelayError> {
        let room = self.presenter_room(session)?;
        {
            let mut state = room.lock();
            if state.pending.remove(&viewer_session_id).is_none() {
                return Err(RelayError::InvalidArgument(
                    "viewer is not awaiting approval".to_owned(),
                ));
            }
            if let Some(viewer) = self.sessions.get(viewer_session_id) {
                viewer.clear_membership();
                viewer.send_message(ServerMessage::AccessDenied {
                    message: "the presenter denied your request".to_owned(),
                });
            }
            session.send_message(ServerMessage::ViewerDenied {
                viewer_session_id,
                pending_count: state.pending.len(),
            });
        }
        self.audit
            .record(
                AuditRecord::new(AuditEvent::ViewerDenied)
                    .with_username(&session.identity.username)
                    .with_session_id(viewer_session_id)
                    .with_room_id(room.id.as_str())
                    .with_detail("join request denied"),
            )
            .await;
        Ok(())
    }

    async fn kick_viewer(
        &self,
        session: &Arc<SessionHandle>,
        viewer_session_id: SessionId,
    ) -> Result<(), RelayError> {
        let room = self.presenter_room(session)?;
        {
            let mut state = room.lock();
            if state.viewers.remove(&viewer_session_id).is_none() {
                return Err(RelayError::InvalidArgument(
                    "viewer is not in the room".to_owned(),
                ));
            }
            if let Some(viewer) = self.sessions.get(viewer_session_id) {
                viewer.clear_membership();
                viewer.send_message(ServerMessage::Kicked {
                    message: "you were removed from the room".to_owned(),
                });
            }
            session.send_message(ServerMessage::ViewerKicked {
                viewer_session_id,
                viewer_count: state.viewers.len(),
            });
        }
        self.audit
            .record(
                AuditRecord::new(AuditEvent::ViewerKicked)
                    .with_username(&session.identity.username)
                    .with_session_id(viewer_session_id)
                    .with_room_id(room.id.as_str())
                    .with_detail("viewer kicked"),
            )
            .await;
        Ok(())
    }

    async fn ban_viewer(
        &self,
        session: &Arc<SessionHandle>,
        viewer_session_id: SessionId,
    ) -> Result<(), RelayError> {
        let room = self.presenter_room(session)?;
        {
            let mut state = room.lock();
            let was_viewer = state.viewers.remove(&viewer_session_id).is_some();
            let was_pending = state.pending.remove(&viewer_session_id).is_some();
            if !was_viewer && !was_pending {
                return Err(RelayError::InvalidArgument(
                    "viewer is not in the room".to_owned(),
                ));
            }
            state.banned.insert(viewer_session_id);
            if let Some(viewer) = self.sessions.get(viewer_session_id) {
                viewer.clear_membership();
                viewer.send_message(ServerMessage::Banned {
                    message: "you were banned from the room".to_owned(),
                });
            }
            session.send_message(ServerMessage::ViewerBanned {
                viewer_session_id,
                viewer_count: state.viewers.len(),
            });
        }
        self.audit
            .record(
                AuditRecord::new(AuditEvent::ViewerBanned)
                    .with_username(&session.identity.username)
                    .with_session_id(viewer_session_id)
                    .with_room_id(room.id.as_str())
                    .with_detail("session id banned for this room instance"),
            )
            .await;
        Ok(())
    }

    // ---- detachment -----------------------------------------------------

    /// Remove `session` from its room, with the presenter path tearing
    /// the whole room down.
    async fn detach(&self, session: &Arc<SessionHandle>, kind: DetachKind) {
        let (room_id, role) = session.membership();
        let Some(room_id) = room_id else {
            return;
        };
        let Some(room) = self.rooms.get(&room_id) else {
            session.clear_membership();
            return;
        };

        match role {
            RoomRole::Presenter => {
                // The presenter of a room never changes; a mismatch
                // means the id was reclaimed by someone else.
                if room.presenter() != session.id {
                    session.clear_membership();
                    return;
                }
                let (relayed, dropped) = Self::evacuate_locked(&room, &self.sessions);
                self.rooms.remove_instance(&room);
                session.clear_membership();
                info!(
                    room_id = %room.id,
                    relayed_frames = relayed,
                    dropped_frames = dropped,
                    uptime_secs = room.created_at.elapsed().as_secs(),
                    "room deleted"
                );
                self.audit
                    .record(
                        AuditRecord::new(AuditEvent::RoomDeleted)
                            .with_username(&session.identity.username)
                            .with_session_id(session.id)
                            .with_room_id(room.id.as_str())
                            .with_detail(format!(
                                "presenter {}",
                                match kind {
                                    DetachKind::Voluntary => "left",
                                    DetachKind::Disconnect => "disconnected",
                                    DetachKind::Switching => "switched rooms",
                                }
                            )),
                    )
                    .await;
            }
            RoomRole::Viewer | RoomRole::PendingViewer => {
                let (removed, joined_at) = {
                    let mut state = room.lock();
                    let viewer = state.viewers.remove(&session.id);
                    let pending = state.pending.remove(&session.id);
                    let removed = viewer.is_some() || pending.is_some();
                    if removed {
                        if let Some(presenter) = self.sessions.get(state.presenter) {
                            presenter.send_message(ServerMessage::ViewerCount {
                                count: state.viewers.len(),
                            });
                        }
                    }
                    (removed, viewer.map(|v| v.joined_at))
                };
                session.clear_membership();
                if removed {
                    let detail = joined_at.map_or_else(
                        || "pending viewer left".to_owned(),
                        |at| format!("viewer left after {}s", at.elapsed().as_secs()),
                    );
                    self.audit
                        .record(
                            AuditRecord::new(AuditEvent::RoomLeft)
                                .with_username(&session.identity.username)
                                .with_session_id(session.id)
                                .with_room_id(room.id.as_str())
                                .with_detail(detail),
                        )
                        .await;
                }
            }
            RoomRole::None => {}
        }
    }
}

impl std::fmt::Debug for RelayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayEngine")
            .field("sessions", &self.sessions.len())
            .field("rooms", &self.rooms.len())
            .finish_non_exhaustive()
    }
}
