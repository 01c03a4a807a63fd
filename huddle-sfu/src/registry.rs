//! Authoritative table of connected peers

use std::collections::HashMap;

use crate::error::{Result, SfuError};
use crate::peer::{Peer, PeerResources};
use crate::types::{PeerId, ProducerId, RoomName};

/// Connected peers keyed by connection identity
///
/// Iteration order is unspecified; room queries filter on each peer's room.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, Peer>,
}

impl PeerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an empty peer record
    pub fn register(&mut self, peer: Peer) -> Result<()> {
        if self.peers.contains_key(&peer.id) {
            return Err(SfuError::DuplicateIdentity(peer.id));
        }
        self.peers.insert(peer.id.clone(), peer);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Delete a peer and hand back what it owned. Removing an absent id is a
    /// no-op returning empty resources.
    pub fn remove(&mut self, id: &PeerId) -> PeerResources {
        self.peers
            .remove(id)
            .map(Peer::into_resources)
            .unwrap_or_default()
    }

    /// Peers whose room is `room`
    pub fn members<'a>(&'a self, room: &'a RoomName) -> impl Iterator<Item = &'a Peer> + 'a {
        self.peers
            .values()
            .filter(move |peer| peer.room.as_ref() == Some(room))
    }

    /// Room-mates of `except`
    pub fn members_except<'a>(
        &'a self,
        room: &'a RoomName,
        except: &'a PeerId,
    ) -> impl Iterator<Item = &'a Peer> + 'a {
        self.members(room).filter(move |peer| &peer.id != except)
    }

    pub fn members_mut<'a>(&'a mut self, room: &'a RoomName) -> impl Iterator<Item = &'a mut Peer> + 'a {
        self.peers
            .values_mut()
            .filter(move |peer| peer.room.as_ref() == Some(room))
    }

    /// Peer owning `producer`, if any
    #[must_use]
    pub fn owner_of_producer(&self, producer: &ProducerId) -> Option<&PeerId> {
        self.peers
            .values()
            .find(|peer| peer.owns_producer(producer))
            .map(|peer| &peer.id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
