//! Room registry.
//!
//! Maps room id strings to rooms. Creation runs through the DashMap
//! entry API so two concurrent `create-room` commands for the same id
//! resolve atomically: at most one reclaims a stale room, the other
//! forks to a fresh id.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use glimpse_core::RoomId;
use tracing::debug;

use crate::room::Room;
use crate::session::SessionTable;

/// Outcome of a creation attempt against one room id.
pub(crate) enum CreateOutcome {
    /// The id was free; the new room is registered.
    Inserted,
    /// The id existed but its presenter is gone; the old room was
    /// discarded and the new room registered under the same id.
    Reclaimed(Arc<Room>),
    /// The id is held by a room with a live presenter.
    Held,
}

#[derive(Debug, Default)]
pub(crate) struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub(crate) fn get(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms
            .get(room_id.as_str())
            .map(|entry| Arc::clone(&entry))
    }

    /// Try to register `room` under its id.
    ///
    /// `sessions` decides liveness: an existing room whose presenter is
    /// no longer in the session table is stale and gets reclaimed.
    /// `on_reclaim` runs on the stale room while the map entry is still
    /// held, so no frame or join against the old instance can slip in
    /// between discard and replacement. The callback must not block.
    pub(crate) fn try_insert(
        &self,
        room: Arc<Room>,
        sessions: &SessionTable,
        on_reclaim: impl FnOnce(&Arc<Room>),
    ) -> CreateOutcome {
        match self.rooms.entry(room.id.as_str().to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(room);
                CreateOutcome::Inserted
            }
            Entry::Occupied(mut entry) => {
                let existing = Arc::clone(entry.get());
                if sessions.contains(existing.presenter()) {
                    CreateOutcome::Held
                } else {
                    debug!(room_id = %room.id, "reclaiming stale room");
                    on_reclaim(&existing);
                    entry.insert(room);
                    CreateOutcome::Reclaimed(existing)
                }
            }
        }
    }

    /// Remove a room, but only the exact instance the caller holds.
    /// Protects a reclaimed id from being deleted by the old
    /// presenter's late teardown.
    pub(crate) fn remove_instance(&self, room: &Arc<Room>) {
        self.rooms
            .remove_if(room.id.as_str(), |_, current| Arc::ptr_eq(current, room));
    }

    pub(crate) fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Rooms currently presented by `username`.
    pub(crate) fn count_presented_by(&self, username: &str, sessions: &SessionTable) -> usize {
        self.rooms
            .iter()
            .filter(|entry| {
                let presenter = entry.presenter();
                sessions
                    .get(presenter)
                    .is_some_and(|s| s.identity.username.eq_ignore_ascii_case(username))
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_core::{Identity, UserRole};

    fn room(id: &str, presenter: glimpse_core::SessionId) -> Arc<Room> {
        Arc::new(Room::new(RoomId::parse(id).unwrap(), presenter, 10, None))
    }

    #[test]
    fn vacant_id_inserts() {
        let registry = RoomRegistry::default();
        let sessions = SessionTable::default();
        let outcome =
            registry.try_insert(room("a", glimpse_core::SessionId::new()), &sessions, |_| {});
        assert!(matches!(outcome, CreateOutcome::Inserted));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn live_presenter_holds_the_id() {
        let registry = RoomRegistry::default();
        let sessions = SessionTable::default();
        let (presenter, _rx) =
            sessions.create(Identity::new("alice", UserRole::User), "127.0.0.1".into());

        registry.try_insert(room("a", presenter.id), &sessions, |_| {});
        let outcome =
            registry.try_insert(room("a", glimpse_core::SessionId::new()), &sessions, |_| {});
        assert!(matches!(outcome, CreateOutcome::Held));
    }

    #[test]
    fn stale_room_is_reclaimed() {
        let registry = RoomRegistry::default();
        let sessions = SessionTable::default();

        // Presenter never registered: the room is stale on arrival.
        registry.try_insert(room("a", glimpse_core::SessionId::new()), &sessions, |_| {});
        let mut callback_ran = false;
        let outcome = registry.try_insert(
            room("a", glimpse_core::SessionId::new()),
            &sessions,
            |_| callback_ran = true,
        );
        assert!(callback_ran);
        assert!(matches!(outcome, CreateOutcome::Reclaimed(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_only_touches_the_same_instance() {
        let registry = RoomRegistry::default();
        let sessions = SessionTable::default();

        let old = room("a", glimpse_core::SessionId::new());
        registry.try_insert(Arc::clone(&old), &sessions, |_| {});
        let CreateOutcome::Reclaimed(_) =
            registry.try_insert(room("a", glimpse_core::SessionId::new()), &sessions, |_| {})
        else {
            panic!("expected reclaim");
        };

        // The old instance's teardown must not delete the new room.
        registry.remove_instance(&old);
        assert_eq!(registry.len(), 1);
    }
}
