// Shared fixtures for coordinator integration tests

#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

use huddle_sfu::engine::{RtpCapabilities, RtpParameters};
use huddle_sfu::protocol::{JoinResponse, ServerMessage};
use huddle_sfu::{
    MediaEngine, MediaKind, Notification, PeerId, PeerOutbox, ProducerId, SessionCoordinator,
    SfuConfig, TransportId, TransportRole,
};

pub struct TestPeer {
    pub id: PeerId,
    pub rx: mpsc::Receiver<ServerMessage>,
}

impl TestPeer {
    /// Notifications queued so far
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let ServerMessage::Notification(notification) = message {
                out.push(notification);
            }
        }
        out
    }
}

pub fn coordinator(engine: Arc<dyn MediaEngine>) -> Arc<SessionCoordinator> {
    Arc::new(SessionCoordinator::new(engine, SfuConfig::default()))
}

pub fn connect(coordinator: &SessionCoordinator, id: &str) -> TestPeer {
    let peer_id = PeerId::from(id);
    let (outbox, rx) = PeerOutbox::channel(peer_id.clone(), 64);
    coordinator
        .connect(peer_id.clone(), outbox)
        .expect("connect peer");
    TestPeer { id: peer_id, rx }
}

pub fn join(coordinator: &SessionCoordinator, peer: &TestPeer, room: &str) -> JoinResponse {
    coordinator.join(&peer.id, room).expect("join room")
}

pub fn vp8_parameters() -> RtpParameters {
    serde_json::from_value(json!({
        "mid": "0",
        "codecs": [{ "mimeType": "video/VP8", "payloadType": 96, "clockRate": 90000 }],
        "encodings": [{ "ssrc": 1111 }],
        "rtcp": { "cname": "test" }
    }))
    .expect("vp8 parameters")
}

pub fn audio_only_capabilities() -> RtpCapabilities {
    serde_json::from_value(json!({
        "codecs": [{ "kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2 }]
    }))
    .expect("audio capabilities")
}

/// Create and connect a transport of `role`
pub async fn open_transport(
    coordinator: &SessionCoordinator,
    peer: &TestPeer,
    role: TransportRole,
) -> TransportId {
    let params = coordinator
        .create_transport(&peer.id, role)
        .await
        .expect("create transport");
    coordinator
        .connect_transport(&peer.id, &params.id, role, params.dtls_parameters.clone())
        .await
        .expect("connect transport");
    params.id
}

/// Join-ready peer publishes one video stream
pub async fn publish_video(coordinator: &SessionCoordinator, peer: &TestPeer) -> (TransportId, ProducerId) {
    let transport = open_transport(coordinator, peer, TransportRole::Upload).await;
    let producer = coordinator
        .produce(&peer.id, &transport, MediaKind::Video, vp8_parameters())
        .await
        .expect("produce video");
    (transport, producer)
}
