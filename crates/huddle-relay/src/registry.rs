//! RoomRegistry: which connections are in which rooms.
//!
//! Two sharded maps kept in agreement:
//! - `rooms`: room → members (the fan-out source)
//! - `memberships`: connection → rooms it is in (for full departure without
//!   scanning unrelated rooms)
//!
//! Lock order is always `memberships` entry, then `rooms` shard. A join
//! holds the connection's index entry while it touches the room, so a
//! concurrent [`RoomRegistry::leave_all`] for that connection sees every room
//! it finished joining.
use std::collections::{HashMap, HashSet};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

use crate::connection::ConnectionHandle;
use crate::error::RelayError;
use crate::types::{now_ms, ConnectionId, RoomId};

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The room did not exist and was created with this connection.
    Created,
    /// Added to an existing room.
    Joined,
    /// Already a member; nothing changed.
    AlreadyMember,
}

/// Point-in-time description of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub member_count: usize,
    pub created_at: u64,
}

struct Room {
    members: HashMap<ConnectionId, ConnectionHandle>,
    created_at: u64,
}

impl Room {
    fn with_first_member(conn: &ConnectionHandle) -> Self {
        let mut members = HashMap::new();
        members.insert(conn.id().clone(), conn.clone());
        Self {
            members,
            created_at: now_ms(),
        }
    }
}

/// Concurrent room → members registry.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Room>,
    memberships: DashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Add `conn` to `room`, creating the room on first join.
    ///
    /// Re-joining is a no-op. A closed handle is rejected.
    pub fn join(&self, room: &RoomId, conn: &ConnectionHandle) -> Result<JoinOutcome, RelayError> {
        let id = conn.id();
        if !conn.is_open() {
            return Err(RelayError::invalid_handle(id.clone(), "connection is closed"));
        }

        let mut joined = self.memberships.entry(id.clone()).or_default();

        // Re-check under the index entry: a disconnect closes the handle
        // before it takes this entry away.
        if !conn.is_open() {
            let left_empty = joined.is_empty();
            drop(joined);
            if left_empty {
                self.memberships.remove_if(id, |_, rooms| rooms.is_empty());
            }
            return Err(RelayError::invalid_handle(id.clone(), "connection is closed"));
        }

        if joined.contains(room) {
            return Ok(JoinOutcome::AlreadyMember);
        }

        let outcome = match self.rooms.entry(room.clone()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().members.insert(id.clone(), conn.clone());
                JoinOutcome::Joined
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Room::with_first_member(conn));
                JoinOutcome::Created
            }
        };
        joined.insert(room.clone());
        drop(joined);

        if outcome == JoinOutcome::Created {
            tracing::info!("room {room}: created by {id}");
        }
        tracing::debug!("room {room}: {id} joined");
        Ok(outcome)
    }

    /// Remove `conn` from `room`. No-op if it was not a member.
    ///
    /// Returns whether a membership was actually removed. The room entry is
    /// dropped once its last member is gone.
    pub fn leave(&self, room: &RoomId, conn: &ConnectionId) -> bool {
        let Some(mut joined) = self.memberships.get_mut(conn) else {
            return false;
        };
        if !joined.remove(room) {
            return false;
        }
        self.remove_member(room, conn);
        let left_empty = joined.is_empty();
        drop(joined);

        if left_empty {
            self.memberships.remove_if(conn, |_, rooms| rooms.is_empty());
        }
        tracing::debug!("room {room}: {conn} left");
        true
    }

    /// Remove `conn` from every room it belongs to.
    ///
    /// Returns the rooms it left (sorted). Calling it again is a no-op.
    ///
    /// The index entry stays locked until every room is updated, so a join
    /// racing this call lands either before (and is undone) or after (and
    /// stays), never half way.
    pub fn leave_all(&self, conn: &ConnectionId) -> Vec<RoomId> {
        let Some(mut joined) = self.memberships.get_mut(conn) else {
            return Vec::new();
        };

        let mut left: Vec<RoomId> = joined.drain().collect();
        left.sort();
        for room in &left {
            self.remove_member(room, conn);
        }
        drop(joined);
        self.memberships.remove_if(conn, |_, rooms| rooms.is_empty());

        if !left.is_empty() {
            tracing::debug!("{conn} left {} room(s)", left.len());
        }
        left
    }

    fn remove_member(&self, room: &RoomId, conn: &ConnectionId) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(mut entry) => {
                entry.members.remove(conn);
                entry.members.is_empty()
            }
            None => false,
        };

        // Re-checked under the shard lock: a join that slipped in between
        // keeps the room alive.
        if now_empty
            && self
                .rooms
                .remove_if(room, |_, r| r.members.is_empty())
                .is_some()
        {
            tracing::info!("room {room}: closed (no members left)");
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Snapshot of the room's members, safe to iterate while the room keeps
    /// changing. Unknown rooms yield an empty list.
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionHandle> {
        self.rooms
            .get(room)
            .map(|r| r.members.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, room: &RoomId) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn is_member(&self, room: &RoomId, conn: &ConnectionId) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|r| r.members.contains_key(conn))
    }

    pub fn member_count(&self, room: &RoomId) -> usize {
        self.rooms.get(room).map(|r| r.members.len()).unwrap_or(0)
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of connections that are in at least one room.
    pub fn connection_count(&self) -> usize {
        self.memberships.len()
    }

    /// Rooms `conn` currently belongs to (sorted).
    pub fn rooms_of(&self, conn: &ConnectionId) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .memberships
            .get(conn)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// All live room ids (sorted).
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn room_info(&self, room: &RoomId) -> Option<RoomInfo> {
        self.rooms.get(room).map(|r| RoomInfo {
            room_id: room.clone(),
            member_count: r.members.len(),
            created_at: r.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionHandle {
        ConnectionHandle::channel(16).0
    }

    fn member_ids(registry: &RoomRegistry, room: &RoomId) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = registry.members(room).iter().map(|m| m.id().clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn first_join_creates_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        let alice = conn();

        assert_eq!(registry.join(&room, &alice).unwrap(), JoinOutcome::Created);
        assert!(registry.contains(&room));
        assert_eq!(registry.member_count(&room), 1);
        assert_eq!(registry.rooms_of(alice.id()), vec![room]);
    }

    #[test]
    fn second_join_adds_to_existing_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        registry.join(&room, &conn()).unwrap();

        assert_eq!(registry.join(&room, &conn()).unwrap(), JoinOutcome::Joined);
        assert_eq!(registry.member_count(&room), 2);
    }

    #[test]
    fn rejoin_does_not_duplicate() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        let alice = conn();

        registry.join(&room, &alice).unwrap();
        assert_eq!(
            registry.join(&room, &alice).unwrap(),
            JoinOutcome::AlreadyMember
        );
        assert_eq!(member_ids(&registry, &room), vec![alice.id().clone()]);
    }

    #[test]
    fn leave_of_only_member_removes_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        let alice = conn();

        registry.join(&room, &alice).unwrap();
        assert!(registry.leave(&room, alice.id()));

        assert!(!registry.contains(&room));
        assert!(!registry.is_member(&room, alice.id()));
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn leave_keeps_room_with_remaining_members() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        let alice = conn();
        let bob = conn();
        registry.join(&room, &alice).unwrap();
        registry.join(&room, &bob).unwrap();

        registry.leave(&room, alice.id());
        assert_eq!(member_ids(&registry, &room), vec![bob.id().clone()]);
    }

    #[test]
    fn leave_twice_is_noop() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        let alice = conn();
        registry.join(&room, &alice).unwrap();

        assert!(registry.leave(&room, alice.id()));
        assert!(!registry.leave(&room, alice.id()));
    }

    #[test]
    fn unknown_room_behaves_as_empty() {
        let registry = RoomRegistry::new();
        let ghost = RoomId::from("ghost");
        let alice = conn();

        assert!(registry.members(&ghost).is_empty());
        assert!(!registry.leave(&ghost, alice.id()));
        assert_eq!(registry.member_count(&ghost), 0);
        assert!(registry.room_info(&ghost).is_none());
    }

    #[test]
    fn leave_all_clears_every_room() {
        let registry = RoomRegistry::new();
        let r1 = RoomId::from("r1");
        let r2 = RoomId::from("r2");
        let alice = conn();
        let bob = conn();
        registry.join(&r1, &alice).unwrap();
        registry.join(&r2, &alice).unwrap();
        registry.join(&r2, &bob).unwrap();

        let left = registry.leave_all(alice.id());
        assert_eq!(left, vec![r1.clone(), r2.clone()]);

        assert!(!registry.contains(&r1));
        assert_eq!(member_ids(&registry, &r2), vec![bob.id().clone()]);
        assert!(registry.rooms_of(alice.id()).is_empty());
        assert!(registry.leave_all(alice.id()).is_empty());
    }

    #[test]
    fn closed_handle_cannot_join() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        let alice = conn();
        alice.close();

        let err = registry.join(&room, &alice).unwrap_err();
        assert!(matches!(err, RelayError::InvalidHandle { .. }));
        assert!(!registry.contains(&room));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_changes() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        let alice = conn();
        let bob = conn();
        registry.join(&room, &alice).unwrap();
        registry.join(&room, &bob).unwrap();

        let snapshot = registry.members(&room);
        registry.leave(&room, bob.id());
        registry.join(&room, &conn()).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&bob));
    }

    #[test]
    fn leave_all_racing_joins_keeps_index_and_rooms_in_agreement() {
        let registry = std::sync::Arc::new(RoomRegistry::new());
        let alice = conn();
        let rooms: Vec<RoomId> = (0..4).map(|i| RoomId::from(format!("r{i}"))).collect();

        let joiners: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                let alice = alice.clone();
                let rooms = rooms.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        registry.join(&rooms[(t + i) % rooms.len()], &alice).unwrap();
                    }
                })
            })
            .collect();
        let sweeper = {
            let registry = registry.clone();
            let id = alice.id().clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    registry.leave_all(&id);
                }
            })
        };
        for t in joiners {
            t.join().unwrap();
        }
        sweeper.join().unwrap();

        let indexed = registry.rooms_of(alice.id());
        for room in &rooms {
            assert_eq!(
                indexed.contains(room),
                registry.is_member(room, alice.id()),
                "index and room {room} disagree"
            );
        }
        assert_eq!(registry.room_ids(), indexed);

        registry.leave_all(alice.id());
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn room_info_reports_members() {
        let registry = RoomRegistry::new();
        let room = RoomId::from("lobby");
        registry.join(&room, &conn()).unwrap();
        registry.join(&room, &conn()).unwrap();

        let info = registry.room_info(&room).unwrap();
        assert_eq!(info.room_id, room);
        assert_eq!(info.member_count, 2);
        assert!(info.created_at > 0);
        assert_eq!(registry.room_ids(), vec![RoomId::from("lobby")]);
    }
}
