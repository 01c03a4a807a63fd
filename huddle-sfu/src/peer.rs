//! Per-connection session record

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{Notification, ServerMessage};
use crate::types::{ConsumerId, MediaKind, PeerId, ProducerId, RoomName, TransportId, TransportRole};

/// Protocol state of a peer, derived from what it owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Connected, no room yet
    Connected,
    /// In a room, no transport yet
    Joined,
    /// Has transports but carries no stream
    Negotiating,
    /// Publishes or receives at least one stream
    Active,
}

#[derive(Debug, Clone)]
pub struct TransportEntry {
    pub id: TransportId,
    pub role: TransportRole,
    pub connected: bool,
    /// Serializes engine calls on this transport
    pub gate: Arc<AsyncMutex<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerEntry {
    pub id: ProducerId,
    pub kind: MediaKind,
    pub transport_id: TransportId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerEntry {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub transport_id: TransportId,
    pub paused: bool,
}

/// Outbound half of a peer's signaling channel
///
/// A peer whose queue overflows has missed a notification and can no longer
/// mirror the room; its `lagged` token is cancelled so the session closes
/// the connection instead of carrying on with a stale view.
#[derive(Debug, Clone)]
pub struct PeerOutbox {
    peer_id: PeerId,
    tx: mpsc::Sender<ServerMessage>,
    lagged: CancellationToken,
}

impl PeerOutbox {
    #[must_use]
    pub fn new(peer_id: PeerId, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            peer_id,
            tx,
            lagged: CancellationToken::new(),
        }
    }

    /// Outbox plus the receiver the connection writer drains
    #[must_use]
    pub fn channel(peer_id: PeerId, capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(peer_id, tx), rx)
    }

    /// Non-blocking push. A full queue marks the peer as lagged.
    pub fn push(&self, notification: Notification) -> bool {
        match self.tx.try_send(ServerMessage::Notification(notification)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(peer_id = %self.peer_id, "Outbound queue full, closing lagging peer");
                self.lagged.cancel();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(peer_id = %self.peer_id, "Peer channel closed, dropping notification");
                false
            }
        }
    }

    /// Deliver a reply, waiting for queue space
    pub async fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(message).await.is_ok()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Cancelled once a notification could not be queued
    #[must_use]
    pub fn lagged(&self) -> CancellationToken {
        self.lagged.clone()
    }
}

/// Engine objects a removed peer owned, to be released by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerResources {
    pub room: Option<RoomName>,
    pub transports: Vec<TransportId>,
    pub producers: Vec<ProducerId>,
    pub consumers: Vec<ConsumerId>,
}

impl PeerResources {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty() && self.producers.is_empty() && self.consumers.is_empty()
    }
}

/// One active signaling connection
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub room: Option<RoomName>,
    pub outbox: PeerOutbox,
    pub connected_at: Instant,
    transports: HashMap<TransportId, TransportEntry>,
    producers: Vec<ProducerEntry>,
    consumers: HashMap<ConsumerId, ConsumerEntry>,
}

impl Peer {
    #[must_use]
    pub fn new(id: PeerId, outbox: PeerOutbox) -> Self {
        Self {
            id,
            room: None,
            outbox,
            connected_at: Instant::now(),
            transports: HashMap::new(),
            producers: Vec::new(),
            consumers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> PeerState {
        if self.room.is_none() {
            PeerState::Connected
        } else if !self.producers.is_empty() || !self.consumers.is_empty() {
            PeerState::Active
        } else if !self.transports.is_empty() {
            PeerState::Negotiating
        } else {
            PeerState::Joined
        }
    }

    /// Look up a transport among this peer's own
    #[must_use]
    pub fn transport(&self, id: &TransportId) -> Option<&TransportEntry> {
        self.transports.get(id)
    }

    pub fn transport_mut(&mut self, id: &TransportId) -> Option<&mut TransportEntry> {
        self.transports.get_mut(id)
    }

    pub fn add_transport(&mut self, id: TransportId, role: TransportRole) {
        self.transports.insert(
            id.clone(),
            TransportEntry {
                id,
                role,
                connected: false,
                gate: Arc::new(AsyncMutex::new(())),
            },
        );
    }

    pub fn transports(&self) -> impl Iterator<Item = &TransportEntry> {
        self.transports.values()
    }

    pub fn add_producer(&mut self, entry: ProducerEntry) {
        self.producers.push(entry);
    }

    /// Producers in creation order
    #[must_use]
    pub fn producers(&self) -> &[ProducerEntry] {
        &self.producers
    }

    #[must_use]
    pub fn owns_producer(&self, id: &ProducerId) -> bool {
        self.producers.iter().any(|p| &p.id == id)
    }

    pub fn producer_ids(&self) -> Vec<ProducerId> {
        self.producers.iter().map(|p| p.id.clone()).collect()
    }

    pub fn add_consumer(&mut self, entry: ConsumerEntry) {
        self.consumers.insert(entry.id.clone(), entry);
    }

    #[must_use]
    pub fn consumer(&self, id: &ConsumerId) -> Option<&ConsumerEntry> {
        self.consumers.get(id)
    }

    pub fn consumer_mut(&mut self, id: &ConsumerId) -> Option<&mut ConsumerEntry> {
        self.consumers.get_mut(id)
    }

    pub fn consumers(&self) -> impl Iterator<Item = &ConsumerEntry> {
        self.consumers.values()
    }

    /// Drop consumers bound to any of `producers`; returns their ids
    pub fn prune_consumers_of(&mut self, producers: &[ProducerId]) -> Vec<ConsumerId> {
        let stale: Vec<ConsumerId> = self
            .consumers
            .values()
            .filter(|c| producers.contains(&c.producer_id))
            .map(|c| c.id.clone())
            .collect();
        for id in &stale {
            self.consumers.remove(id);
        }
        stale
    }

    #[must_use]
    pub fn into_resources(self) -> PeerResources {
        PeerResources {
            room: self.room,
            transports: self.transports.into_keys().collect(),
            producers: self.producers.into_iter().map(|p| p.id).collect(),
            consumers: self.consumers.into_keys().collect(),
        }
    }
}
