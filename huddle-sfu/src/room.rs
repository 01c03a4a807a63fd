//! Room membership and room-name reservations
//!
//! A room exists while at least one peer is a member. Names can also be
//! reserved ahead of any membership (generated names handed to a client that
//! has not joined yet); a reservation is claimed by the first join and is
//! dropped with the last member.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::types::{PeerId, RoomName};

const ALPHANUMERIC: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
    'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U',
    'V', 'W', 'X', 'Y', 'Z',
];

/// Candidates drawn per generation before giving up
const MAX_GENERATION_ATTEMPTS: usize = ALPHANUMERIC.len() * 4;

#[derive(Debug, Default)]
pub struct RoomIndex {
    members: HashMap<RoomName, HashSet<PeerId>>,
    /// Names reserved without members, with the reservation time
    reservations: HashMap<RoomName, Instant>,
}

impl RoomIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current members of `room`; empty if the room does not exist
    #[must_use]
    pub fn members_of(&self, room: &RoomName) -> HashSet<PeerId> {
        self.members.get(room).cloned().unwrap_or_default()
    }

    /// Whether `room` is occupied or reserved
    #[must_use]
    pub fn is_taken(&self, room: &RoomName) -> bool {
        self.members.contains_key(room) || self.reservations.contains_key(room)
    }

    /// Mark `room` in use. Returns false if it already was.
    pub fn reserve(&mut self, room: RoomName, now: Instant) -> bool {
        if self.is_taken(&room) {
            return false;
        }
        self.reservations.insert(room, now);
        true
    }

    /// Drop the reservation of an unoccupied name. Occupied rooms keep theirs.
    pub fn release(&mut self, room: &RoomName) -> bool {
        if self.members.contains_key(room) {
            return false;
        }
        self.reservations.remove(room).is_some()
    }

    /// Add `peer` to `room`, claiming any reservation on it
    pub fn add_member(&mut self, room: RoomName, peer: PeerId) {
        self.reservations.remove(&room);
        self.members.entry(room).or_default().insert(peer);
    }

    /// Remove `peer` from `room`. Returns true if the room is now gone.
    pub fn remove_member(&mut self, room: &RoomName, peer: &PeerId) -> bool {
        let Some(members) = self.members.get_mut(room) else {
            return false;
        };
        members.remove(peer);
        if members.is_empty() {
            self.members.remove(room);
            self.release(room);
            return true;
        }
        false
    }

    /// Reserve a fresh alphanumeric name of `length` characters.
    /// `None` when every candidate drawn was taken.
    pub fn generate_unique_name(&mut self, length: usize, now: Instant) -> Option<RoomName> {
        self.generate_unique_name_with(now, || nanoid::nanoid!(length, &ALPHANUMERIC))
    }

    /// Reserve the first candidate from `next` that is not taken
    pub fn generate_unique_name_with(
        &mut self,
        now: Instant,
        mut next: impl FnMut() -> String,
    ) -> Option<RoomName> {
        (0..MAX_GENERATION_ATTEMPTS).find_map(|_| {
            let candidate = RoomName::from(next());
            self.reserve(candidate.clone(), now).then_some(candidate)
        })
    }

    /// Release reservations older than `ttl` that nobody joined
    pub fn sweep_expired(&mut self, ttl: Duration, now: Instant) -> Vec<RoomName> {
        let expired: Vec<RoomName> = self
            .reservations
            .iter()
            .filter(|(_, reserved_at)| now.saturating_duration_since(**reserved_at) >= ttl)
            .map(|(room, _)| room.clone())
            .collect();
        for room in &expired {
            self.release(room);
        }
        expired
    }

    /// Rooms with at least one member
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }
}
