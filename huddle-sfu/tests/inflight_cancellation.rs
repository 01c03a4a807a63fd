// Integration tests for engine calls that outlive their peer
//
// A scripted engine wraps the in-process engine and can hold a call open
// after the underlying object was created, or fail it outright. While a call
// is held the peer disconnects; the coordinator must discard the result,
// close what the engine created and leave no trace in the registry.

mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use common::{connect, coordinator, join, open_transport, vp8_parameters};
use huddle_sfu::engine::{
    ConsumerParams, DtlsParameters, RtpCapabilities, RtpParameters, TransportParams,
};
use huddle_sfu::{
    ConsumerId, EngineConfig, LocalMediaEngine, MediaEngine, MediaKind, Notification, PeerId,
    PeerOutbox, PeerState, ProducerId, Result, RoomName, ServerMessage, SfuError,
    SignalingSession, SignalingStream, TransportId, TransportRole,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    CreateTransport,
    Produce,
    Consume,
}

struct ScriptedEngine {
    inner: LocalMediaEngine,
    hold: Mutex<Option<Step>>,
    fail: Mutex<Option<(Step, SfuError)>>,
    entered: Notify,
    release: Notify,
}

impl ScriptedEngine {
    fn new() -> Self {
        Self {
            inner: LocalMediaEngine::new(EngineConfig::default()),
            hold: Mutex::new(None),
            fail: Mutex::new(None),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Suspend the next `step` after the engine object exists
    fn hold_next(&self, step: Step) {
        *self.hold.lock() = Some(step);
    }

    fn fail_next(&self, step: Step, err: SfuError) {
        *self.fail.lock() = Some((step, err));
    }

    fn injected_failure(&self, step: Step) -> Result<()> {
        let mut fail = self.fail.lock();
        if fail.as_ref().is_some_and(|(s, _)| *s == step) {
            if let Some((_, err)) = fail.take() {
                return Err(err);
            }
        }
        Ok(())
    }

    async fn maybe_hold(&self, step: Step) {
        let held = {
            let mut hold = self.hold.lock();
            if *hold == Some(step) {
                *hold = None;
                true
            } else {
                false
            }
        };
        if held {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.inner.rtp_capabilities()
    }

    async fn create_transport(&self, role: TransportRole) -> Result<TransportParams> {
        self.injected_failure(Step::CreateTransport)?;
        let params = self.inner.create_transport(role).await?;
        self.maybe_hold(Step::CreateTransport).await;
        Ok(params)
    }

    async fn connect_transport(&self, transport_id: &TransportId, dtls: DtlsParameters) -> Result<()> {
        self.inner.connect_transport(transport_id, dtls).await
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId> {
        self.injected_failure(Step::Produce)?;
        let id = self.inner.produce(transport_id, kind, rtp_parameters).await?;
        self.maybe_hold(Step::Produce).await;
        Ok(id)
    }

    fn can_consume(&self, producer_id: &ProducerId, capabilities: &RtpCapabilities) -> bool {
        self.inner.can_consume(producer_id, capabilities)
    }

    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        capabilities: &RtpCapabilities,
    ) -> Result<ConsumerParams> {
        self.injected_failure(Step::Consume)?;
        let params = self.inner.consume(transport_id, producer_id, capabilities).await?;
        self.maybe_hold(Step::Consume).await;
        Ok(params)
    }

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<()> {
        self.inner.resume_consumer(consumer_id).await
    }

    async fn close_transport(&self, transport_id: &TransportId) {
        self.inner.close_transport(transport_id).await;
    }

    async fn close_producer(&self, producer_id: &ProducerId) {
        self.inner.close_producer(producer_id).await;
    }

    async fn close_consumer(&self, consumer_id: &ConsumerId) {
        self.inner.close_consumer(consumer_id).await;
    }

    fn died(&self) -> CancellationToken {
        self.inner.died()
    }
}

/// Connection that sends its frames, then stays open until `hang_up` fires
struct ScriptedConnection {
    frames: VecDeque<String>,
    hang_up: CancellationToken,
}

#[async_trait]
impl SignalingStream for ScriptedConnection {
    async fn recv(&mut self) -> Option<std::result::Result<String, String>> {
        if let Some(frame) = self.frames.pop_front() {
            return Some(Ok(frame));
        }
        self.hang_up.cancelled().await;
        None
    }
}

#[tokio::test]
async fn test_transport_created_after_disconnect_is_closed() {
    let engine = Arc::new(ScriptedEngine::new());
    let coordinator = coordinator(engine.clone());
    let a = connect(&coordinator, "a");
    join(&coordinator, &a, "r1");

    engine.hold_next(Step::CreateTransport);
    let pending = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        let peer_id = a.id.clone();
        async move { coordinator.create_transport(&peer_id, TransportRole::Upload).await }
    });

    engine.entered.notified().await;
    assert_eq!(engine.inner.transport_count(), 1);

    coordinator.disconnect(&a.id).await;
    engine.release.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, SfuError::PeerNotFound(a.id.clone()));
    assert!(err.is_benign_race());
    assert_eq!(engine.inner.transport_count(), 0);
    assert!(coordinator.peer_snapshot(&a.id).is_none());
    assert_eq!(coordinator.peer_count(), 0);
}

#[tokio::test]
async fn test_producer_created_after_disconnect_is_not_announced() {
    let engine = Arc::new(ScriptedEngine::new());
    let coordinator = coordinator(engine.clone());
    let a = connect(&coordinator, "a");
    let mut b = connect(&coordinator, "b");
    join(&coordinator, &a, "r1");
    join(&coordinator, &b, "r1");
    let upload = open_transport(&coordinator, &a, TransportRole::Upload).await;

    engine.hold_next(Step::Produce);
    let pending = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        let peer_id = a.id.clone();
        async move {
            coordinator
                .produce(&peer_id, &upload, MediaKind::Video, vp8_parameters())
                .await
        }
    });

    engine.entered.notified().await;
    coordinator.disconnect(&a.id).await;
    engine.release.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_benign_race());
    assert_eq!(engine.inner.producer_count(), 0);

    let received = b.drain();
    assert_eq!(
        received,
        vec![huddle_sfu::Notification::PeerClosed { peer_id: a.id.clone() }]
    );
}

#[tokio::test]
async fn test_consumer_created_after_disconnect_is_closed() {
    let engine = Arc::new(ScriptedEngine::new());
    let coordinator = coordinator(engine.clone());
    let a = connect(&coordinator, "a");
    let b = connect(&coordinator, "b");
    join(&coordinator, &a, "r1");
    let joined = join(&coordinator, &b, "r1");
    let (_, producer) = common::publish_video(&coordinator, &a).await;
    let download = open_transport(&coordinator, &b, TransportRole::Download).await;

    engine.hold_next(Step::Consume);
    let pending = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        let peer_id = b.id.clone();
        let capabilities = joined.capabilities.clone();
        async move {
            coordinator
                .consume(&peer_id, &download, &producer, &capabilities)
                .await
        }
    });

    engine.entered.notified().await;
    assert_eq!(engine.inner.consumer_count(), 1);
    coordinator.disconnect(&b.id).await;
    engine.release.notify_one();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_benign_race());
    assert_eq!(engine.inner.consumer_count(), 0);
    assert_eq!(engine.inner.producer_count(), 1);
    assert_eq!(coordinator.peer_snapshot(&a.id).unwrap().state, PeerState::Active);
}

#[tokio::test]
async fn test_engine_failure_leaves_peer_untouched() {
    let engine = Arc::new(ScriptedEngine::new());
    let coordinator = coordinator(engine.clone());
    let a = connect(&coordinator, "a");
    let mut b = connect(&coordinator, "b");
    join(&coordinator, &a, "r1");
    join(&coordinator, &b, "r1");

    engine.fail_next(
        Step::CreateTransport,
        SfuError::EngineFailure("worker refused".to_string()),
    );
    let err = coordinator
        .create_transport(&a.id, TransportRole::Upload)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ENGINE_FAILURE");
    assert_eq!(coordinator.peer_snapshot(&a.id).unwrap().state, PeerState::Joined);

    let upload = open_transport(&coordinator, &a, TransportRole::Upload).await;
    engine.fail_next(Step::Produce, SfuError::EngineFailure("bad parameters".to_string()));
    let err = coordinator
        .produce(&a.id, &upload, MediaKind::Video, vp8_parameters())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ENGINE_FAILURE");
    assert!(coordinator.peer_snapshot(&a.id).unwrap().producers.is_empty());
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn test_connection_loss_during_stalled_request_cleans_up() {
    let engine = Arc::new(ScriptedEngine::new());
    let coordinator = coordinator(engine.clone());
    let mut b = connect(&coordinator, "b");
    join(&coordinator, &b, "r1");

    let a = PeerId::from("a");
    let (outbox, _a_rx) = PeerOutbox::channel(a.clone(), 16);
    let session = SignalingSession::open(Arc::clone(&coordinator), a.clone(), outbox).unwrap();
    let hang_up = CancellationToken::new();
    let mut connection = ScriptedConnection {
        frames: VecDeque::from([
            r#"{"id": 1, "event": "joinRoom", "roomName": "r1"}"#.to_string(),
            r#"{"id": 2, "event": "createWebRtcTransport", "consumer": false}"#.to_string(),
        ]),
        hang_up: hang_up.clone(),
    };

    engine.hold_next(Step::CreateTransport);
    let running = tokio::spawn(async move { session.run(&mut connection).await });

    engine.entered.notified().await;
    assert_eq!(
        coordinator.room_members(&RoomName::from("r1")),
        vec![a.clone(), b.id.clone()]
    );

    // The engine is still holding the transport when the client goes away
    hang_up.cancel();
    let message = tokio::time::timeout(Duration::from_secs(5), b.rx.recv())
        .await
        .expect("room-mate notified while the request is stalled")
        .expect("room-mate channel open");
    assert_eq!(
        message,
        ServerMessage::Notification(Notification::PeerClosed { peer_id: a.clone() })
    );
    assert_eq!(coordinator.peer_count(), 1);
    assert_eq!(coordinator.room_members(&RoomName::from("r1")), vec![b.id.clone()]);

    engine.release.notify_one();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("session finishes")
        .unwrap();
    assert_eq!(engine.inner.transport_count(), 0);
    assert!(coordinator.peer_snapshot(&a).is_none());
}
