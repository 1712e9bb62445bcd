use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Room information for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub name: String,
    pub member_count: usize,
}

/// Tracks room membership in both directions.
///
/// `rooms` maps a room name to its members and `connection_rooms` maps a
/// connection to the rooms it is in. The two maps always describe the same set
/// of (connection, room) pairs, and neither ever holds an empty set: a room
/// exists exactly while it has at least one member.
///
/// The manager itself is not synchronised; the dispatcher keeps it behind a
/// single lock so both maps change together.
#[derive(Debug, Default)]
pub struct RoomManager {
    /// Map of room name to member connection IDs
    rooms: HashMap<String, HashSet<String>>,
    /// Map of connection ID to the names of the rooms it belongs to
    connection_rooms: HashMap<String, HashSet<String>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room, creating the room if needed.
    /// Returns false if the connection was already a member.
    pub fn join(&mut self, connection_id: &str, room: &str) -> bool {
        let inserted = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string());

        if inserted {
            self.connection_rooms
                .entry(connection_id.to_string())
                .or_default()
                .insert(room.to_string());
        }

        inserted
    }

    /// Removes a connection from a room, deleting the room once it is empty.
    /// Returns false if there was nothing to leave.
    pub fn leave(&mut self, connection_id: &str, room: &str) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };

        if !members.remove(connection_id) {
            return false;
        }

        if members.is_empty() {
            self.rooms.remove(room);
        }

        if let Some(joined) = self.connection_rooms.get_mut(connection_id) {
            joined.remove(room);
            if joined.is_empty() {
                self.connection_rooms.remove(connection_id);
            }
        }

        true
    }

    /// Removes a connection from every room it belongs to.
    /// Returns the names of the rooms it left.
    pub fn leave_all(&mut self, connection_id: &str) -> Vec<String> {
        let joined: Vec<String> = self
            .connection_rooms
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default();

        joined
            .into_iter()
            .filter(|room| self.leave(connection_id, room))
            .collect()
    }

    /// Snapshot of a room's members; empty for an unknown room
    pub fn members_of(&self, room: &str) -> HashSet<String> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Snapshot of the rooms a connection belongs to
    pub fn rooms_of(&self, connection_id: &str) -> HashSet<String> {
        self.connection_rooms
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    pub fn is_member(&self, connection_id: &str, room: &str) -> bool {
        self.rooms
            .get(room)
            .map_or(false, |members| members.contains(connection_id))
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Lists all live rooms
    pub fn list_rooms(&self) -> Vec<RoomInfo> {
        self.rooms
            .iter()
            .map(|(name, members)| RoomInfo {
                name: name.clone(),
                member_count: members.len(),
            })
            .collect()
    }

    /// Checks that both indexes describe the same memberships and that no empty
    /// set is left behind
    pub fn is_consistent(&self) -> bool {
        let forward = self.rooms.iter().all(|(room, members)| {
            !members.is_empty()
                && members.iter().all(|id| {
                    self.connection_rooms
                        .get(id)
                        .map_or(false, |rooms| rooms.contains(room))
                })
        });

        let backward = self.connection_rooms.iter().all(|(id, rooms)| {
            !rooms.is_empty()
                && rooms.iter().all(|room| {
                    self.rooms
                        .get(room)
                        .map_or(false, |members| members.contains(id))
                })
        });

        forward && backward
    }
}
