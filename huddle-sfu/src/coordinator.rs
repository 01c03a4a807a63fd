//! Session coordinator
//!
//! Every mutation of the peer registry and room index goes through here.
//! Both live behind one lock so room membership and producer sets are read
//! and written as a single consistent snapshot. The lock is never held
//! across an engine call: each operation validates under the lock, releases
//! it, awaits the engine, then re-locks and checks the peer is still
//! registered before recording the result. If the peer left in the
//! meantime the freshly created engine object is closed and the result
//! discarded.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use huddle_core::metrics;

use crate::config::SfuConfig;
use crate::engine::{ConsumerParams, DtlsParameters, MediaEngine, RtpCapabilities, RtpParameters, TransportParams};
use crate::error::{Result, SfuError};
use crate::peer::{ConsumerEntry, Peer, PeerOutbox, PeerState, ProducerEntry};
use crate::protocol::{JoinResponse, ManifestEntry, Notification};
use crate::registry::PeerRegistry;
use crate::room::RoomIndex;
use crate::types::{ConsumerId, MediaKind, PeerId, ProducerId, RoomName, TransportId, TransportRole};

/// Shared state guarded by the coordinator lock
#[derive(Debug, Default)]
struct SessionState {
    peers: PeerRegistry,
    rooms: RoomIndex,
}

impl SessionState {
    fn peer(&self, peer_id: &PeerId) -> Result<&Peer> {
        self.peers
            .get(peer_id)
            .ok_or_else(|| SfuError::PeerNotFound(peer_id.clone()))
    }

    fn peer_mut(&mut self, peer_id: &PeerId) -> Result<&mut Peer> {
        self.peers
            .get_mut(peer_id)
            .ok_or_else(|| SfuError::PeerNotFound(peer_id.clone()))
    }

    /// The caller's room; fails before join
    fn joined_peer(&self, peer_id: &PeerId) -> Result<(&Peer, RoomName)> {
        let peer = self.peer(peer_id)?;
        let room = peer.room.clone().ok_or(SfuError::NotJoined)?;
        Ok((peer, room))
    }

    /// Gate of one of the caller's transports, checked against `expected`
    fn transport_gate(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        expected: TransportRole,
    ) -> Result<Arc<AsyncMutex<()>>> {
        let (peer, _) = self.joined_peer(peer_id)?;
        let transport = peer
            .transport(transport_id)
            .ok_or_else(|| SfuError::TransportNotFound(transport_id.clone()))?;
        if transport.role != expected {
            return Err(SfuError::WrongTransportRole {
                id: transport_id.clone(),
                expected,
                actual: transport.role,
            });
        }
        Ok(Arc::clone(&transport.gate))
    }

    /// Still registered and still owning the transport
    fn owns_transport(&self, peer_id: &PeerId, transport_id: &TransportId) -> bool {
        self.peers
            .get(peer_id)
            .is_some_and(|peer| peer.transport(transport_id).is_some())
    }

    fn update_gauges(&self) {
        metrics::ACTIVE_PEERS.set(i64::try_from(self.peers.len()).unwrap_or(i64::MAX));
        metrics::ACTIVE_ROOMS.set(i64::try_from(self.rooms.room_count()).unwrap_or(i64::MAX));
    }
}

pub struct SessionCoordinator {
    engine: Arc<dyn MediaEngine>,
    state: Mutex<SessionState>,
    config: SfuConfig,
}

impl SessionCoordinator {
    #[must_use]
    pub fn new(engine: Arc<dyn MediaEngine>, config: SfuConfig) -> Self {
        info!(
            generated_name_length = config.generated_name_length,
            reservation_ttl_secs = config.reservation_ttl.as_secs(),
            "Session coordinator initialized"
        );
        Self {
            engine,
            state: Mutex::new(SessionState::default()),
            config,
        }
    }

    /// Cancelled when the media engine dies
    #[must_use]
    pub fn engine_died(&self) -> CancellationToken {
        self.engine.died()
    }

    /// Register a new connection
    pub fn connect(&self, peer_id: PeerId, outbox: PeerOutbox) -> Result<()> {
        let mut state = self.state.lock();
        state.peers.register(Peer::new(peer_id.clone(), outbox))?;
        state.update_gauges();

        info!(peer_id = %peer_id, total_peers = state.peers.len(), "Peer connected");
        Ok(())
    }

    /// Reserve a fresh room name nobody else holds
    pub fn generate_room_name(&self) -> Result<RoomName> {
        let length = self.config.generated_name_length;
        let name = self
            .state
            .lock()
            .rooms
            .generate_unique_name(length, Instant::now())
            .ok_or(SfuError::RoomNamesExhausted(length))?;
        debug!(room = %name, "Reserved generated room name");
        Ok(name)
    }

    /// Put the peer in `room_name` and describe who is already there
    pub fn join(&self, peer_id: &PeerId, room_name: &str) -> Result<JoinResponse> {
        let room = RoomName::parse(room_name, self.config.max_room_name_length)?;
        let capabilities = self.engine.rtp_capabilities();

        let mut state = self.state.lock();
        let peer = state.peer(peer_id)?;
        if let Some(current) = &peer.room {
            return Err(SfuError::AlreadyJoined(current.to_string()));
        }

        let mut manifest: Vec<ManifestEntry> = state
            .peers
            .members(&room)
            .map(|member| ManifestEntry {
                peer_id: member.id.clone(),
                producer_ids: member.producer_ids(),
            })
            .collect();
        manifest.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));

        state.peer_mut(peer_id)?.room = Some(room.clone());
        state.rooms.add_member(room.clone(), peer_id.clone());
        state.update_gauges();

        info!(
            peer_id = %peer_id,
            room = %room,
            existing_peers = manifest.len(),
            "Peer joined room"
        );

        Ok(JoinResponse {
            capabilities,
            manifest,
        })
    }

    pub async fn create_transport(
        &self,
        peer_id: &PeerId,
        role: TransportRole,
    ) -> Result<TransportParams> {
        self.state.lock().joined_peer(peer_id)?;

        let params = self.engine.create_transport(role).await.inspect_err(|e| {
            error!(peer_id = %peer_id, %role, error = %e, "Failed to create transport");
        })?;

        {
            let mut state = self.state.lock();
            if let Some(peer) = state.peers.get_mut(peer_id) {
                peer.add_transport(params.id.clone(), role);
                debug!(peer_id = %peer_id, transport_id = %params.id, %role, "Transport attached");
                return Ok(params);
            }
        }

        self.engine.close_transport(&params.id).await;
        Err(SfuError::PeerNotFound(peer_id.clone()))
    }

    /// Complete the handshake of one of the caller's transports
    pub async fn connect_transport(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        expected: TransportRole,
        dtls: DtlsParameters,
    ) -> Result<()> {
        let gate = self.state.lock().transport_gate(peer_id, transport_id, expected)?;
        let _guard = gate.lock().await;

        self.engine.connect_transport(transport_id, dtls).await?;

        let mut state = self.state.lock();
        let transport = state
            .peer_mut(peer_id)?
            .transport_mut(transport_id)
            .ok_or_else(|| SfuError::TransportNotFound(transport_id.clone()))?;
        transport.connected = true;

        debug!(peer_id = %peer_id, transport_id = %transport_id, role = %expected, "Transport connected");
        Ok(())
    }

    /// Publish a stream and announce it to the rest of the room
    pub async fn produce(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId> {
        let gate = self
            .state
            .lock()
            .transport_gate(peer_id, transport_id, TransportRole::Upload)?;
        let _guard = gate.lock().await;

        let producer_id = self
            .engine
            .produce(transport_id, kind, rtp_parameters)
            .await
            .inspect_err(|e| {
                error!(peer_id = %peer_id, transport_id = %transport_id, error = %e, "Failed to create producer");
            })?;

        let notified = {
            let mut state = self.state.lock();
            if state.owns_transport(peer_id, transport_id) {
                let peer = state.peer_mut(peer_id)?;
                peer.add_producer(ProducerEntry {
                    id: producer_id.clone(),
                    kind,
                    transport_id: transport_id.clone(),
                });
                let room = peer.room.clone().ok_or(SfuError::NotJoined)?;

                let mut notified = 0;
                for member in state.peers.members_except(&room, peer_id) {
                    if member.outbox.push(Notification::NewProducer {
                        producer_id: producer_id.clone(),
                        peer_id: peer_id.clone(),
                    }) {
                        notified += 1;
                    }
                }
                Some((room, notified))
            } else {
                None
            }
        };

        let Some((room, notified)) = notified else {
            self.engine.close_producer(&producer_id).await;
            return Err(SfuError::PeerNotFound(peer_id.clone()));
        };

        metrics::PRODUCERS_CREATED
            .with_label_values(&[kind.as_str()])
            .inc();
        info!(
            peer_id = %peer_id,
            room = %room,
            producer_id = %producer_id,
            %kind,
            notified,
            "Producer created"
        );
        Ok(producer_id)
    }

    /// Subscribe to a room-mate's producer; the consumer starts paused
    pub async fn consume(
        &self,
        peer_id: &PeerId,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        capabilities: &RtpCapabilities,
    ) -> Result<ConsumerParams> {
        let gate = {
            let state = self.state.lock();
            let gate = state.transport_gate(peer_id, transport_id, TransportRole::Download)?;
            Self::check_consumable(&state, peer_id, producer_id)?;
            gate
        };
        let _guard = gate.lock().await;

        if !self.engine.can_consume(producer_id, capabilities) {
            return Err(SfuError::IncompatibleCapabilities(format!(
                "cannot consume producer {producer_id} with the given capabilities"
            )));
        }

        let params = self
            .engine
            .consume(transport_id, producer_id, capabilities)
            .await
            .inspect_err(|e| {
                warn!(peer_id = %peer_id, producer_id = %producer_id, error = %e, "Failed to create consumer");
            })?;

        let recorded = {
            let mut state = self.state.lock();
            let producer_alive = state.peers.owner_of_producer(producer_id).is_some();
            if !state.owns_transport(peer_id, transport_id) {
                Err(SfuError::PeerNotFound(peer_id.clone()))
            } else if !producer_alive {
                Err(SfuError::ProducerNotFound(producer_id.clone()))
            } else {
                state.peer_mut(peer_id)?.add_consumer(ConsumerEntry {
                    id: params.id.clone(),
                    producer_id: producer_id.clone(),
                    transport_id: transport_id.clone(),
                    paused: true,
                });
                Ok(())
            }
        };

        if let Err(e) = recorded {
            self.engine.close_consumer(&params.id).await;
            return Err(e);
        }

        debug!(
            peer_id = %peer_id,
            consumer_id = %params.id,
            producer_id = %producer_id,
            "Consumer created paused"
        );
        Ok(params)
    }

    fn check_consumable(state: &SessionState, peer_id: &PeerId, producer_id: &ProducerId) -> Result<()> {
        let (_, room) = state.joined_peer(peer_id)?;
        let owner = state
            .peers
            .owner_of_producer(producer_id)
            .ok_or_else(|| SfuError::ProducerNotFound(producer_id.clone()))?;
        if owner == peer_id {
            return Err(SfuError::IncompatibleCapabilities(
                "a peer cannot consume its own producer".to_string(),
            ));
        }
        let same_room = state
            .peers
            .get(owner)
            .is_some_and(|p| p.room.as_ref() == Some(&room));
        if !same_room {
            return Err(SfuError::ProducerNotFound(producer_id.clone()));
        }
        Ok(())
    }

    /// Start media flow on one of the caller's consumers
    pub async fn resume_consumer(&self, peer_id: &PeerId, consumer_id: &ConsumerId) -> Result<()> {
        let gate = {
            let state = self.state.lock();
            let peer = state.peer(peer_id)?;
            let consumer = peer
                .consumer(consumer_id)
                .ok_or_else(|| SfuError::ConsumerNotFound(consumer_id.clone()))?;
            peer.transport(&consumer.transport_id)
                .map(|t| Arc::clone(&t.gate))
                .ok_or_else(|| SfuError::TransportNotFound(consumer.transport_id.clone()))?
        };
        let _guard = gate.lock().await;

        self.engine.resume_consumer(consumer_id).await?;

        let mut state = self.state.lock();
        let consumer = state
            .peer_mut(peer_id)?
            .consumer_mut(consumer_id)
            .ok_or_else(|| SfuError::ConsumerNotFound(consumer_id.clone()))?;
        consumer.paused = false;

        debug!(peer_id = %peer_id, consumer_id = %consumer_id, "Consumer resumed");
        Ok(())
    }

    /// Tear down everything the peer owned and tell its room-mates.
    /// Safe to call more than once.
    pub async fn disconnect(&self, peer_id: &PeerId) {
        let (resources, remaining) = {
            let mut state = self.state.lock();
            if !state.peers.contains(peer_id) {
                return;
            }
            let resources = state.peers.remove(peer_id);

            let mut remaining = Vec::new();
            if let Some(room) = &resources.room {
                if state.rooms.remove_member(room, peer_id) {
                    info!(room = %room, "Room closed");
                }
                for member in state.peers.members_mut(room) {
                    let pruned = member.prune_consumers_of(&resources.producers);
                    if !pruned.is_empty() {
                        debug!(peer_id = %member.id, pruned = pruned.len(), "Dropped consumers of departed peer");
                    }
                    remaining.push(member.outbox.clone());
                }
            }
            state.update_gauges();
            (resources, remaining)
        };

        for transport_id in &resources.transports {
            self.engine.close_transport(transport_id).await;
        }

        for outbox in &remaining {
            outbox.push(Notification::PeerClosed {
                peer_id: peer_id.clone(),
            });
        }

        info!(
            peer_id = %peer_id,
            room = ?resources.room.as_ref().map(RoomName::as_str),
            transports = resources.transports.len(),
            producers = resources.producers.len(),
            consumers = resources.consumers.len(),
            notified = remaining.len(),
            "Peer disconnected"
        );
    }

    /// Release generated names nobody joined within the reservation TTL
    pub fn sweep_reservations(&self) -> usize {
        self.sweep_reservations_at(Instant::now())
    }

    pub fn sweep_reservations_at(&self, now: Instant) -> usize {
        let swept = self
            .state
            .lock()
            .rooms
            .sweep_expired(self.config.reservation_ttl, now);
        if !swept.is_empty() {
            info!(released = swept.len(), "Released expired room name reservations");
        }
        swept.len()
    }

    /// Spawn the periodic reservation sweep; stops when `shutdown` fires
    pub fn start_maintenance(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(coordinator.config.sweep_interval);
            info!(
                interval_secs = coordinator.config.sweep_interval.as_secs(),
                "Starting reservation sweep task"
            );
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("Reservation sweep task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        coordinator.sweep_reservations();
                    }
                }
            }
        })
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.room_count()
    }

    #[must_use]
    pub fn is_room_taken(&self, room: &RoomName) -> bool {
        self.state.lock().rooms.is_taken(room)
    }

    #[must_use]
    pub fn room_members(&self, room: &RoomName) -> Vec<PeerId> {
        let mut members: Vec<PeerId> = self.state.lock().rooms.members_of(room).into_iter().collect();
        members.sort();
        members
    }

    /// Point-in-time view of one peer
    #[must_use]
    pub fn peer_snapshot(&self, peer_id: &PeerId) -> Option<PeerSnapshot> {
        let state = self.state.lock();
        let peer = state.peers.get(peer_id)?;
        Some(PeerSnapshot {
            id: peer.id.clone(),
            room: peer.room.clone(),
            state: peer.state(),
            transports: peer.transports().map(|t| (t.id.clone(), t.role, t.connected)).collect(),
            producers: peer.producer_ids(),
            consumers: peer
                .consumers()
                .map(|c| (c.id.clone(), c.producer_id.clone(), c.paused))
                .collect(),
        })
    }
}

/// Copy of a peer record, detached from the lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub id: PeerId,
    pub room: Option<RoomName>,
    pub state: PeerState,
    /// (id, role, connected)
    pub transports: Vec<(TransportId, TransportRole, bool)>,
    pub producers: Vec<ProducerId>,
    /// (id, producer, paused)
    pub consumers: Vec<(ConsumerId, ProducerId, bool)>,
}
