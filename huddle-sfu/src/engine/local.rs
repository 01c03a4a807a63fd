//! In-process media engine
//!
//! Keeps routers, transports, producers and consumers as in-memory records and
//! performs capability negotiation against the configured codec list. Ports
//! are allocated from the configured range and returned when a transport closes.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use huddle_core::config::MediaConfig;

use super::rtp::{
    ConsumerParams, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters,
    IceProtocol, RtpCapabilities, RtpCodecCapability, RtpCodecParameters, RtpParameters,
    TransportParams,
};
use super::MediaEngine;
use crate::error::{Result, SfuError};
use crate::types::{ConsumerId, MediaKind, ProducerId, TransportId, TransportRole};

/// First payload type handed to codecs without a preferred one
const DYNAMIC_PAYLOAD_TYPE_START: u8 = 100;

const UDP_CANDIDATE_PRIORITY: u32 = 1_076_302_079;
const TCP_CANDIDATE_PRIORITY: u32 = 1_076_276_479;

/// Media engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub codecs: Vec<RtpCodecCapability>,
    pub listen_ip: String,
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            codecs: vec![
                RtpCodecCapability {
                    kind: MediaKind::Audio,
                    mime_type: MIME_TYPE_OPUS.to_string(),
                    preferred_payload_type: None,
                    clock_rate: 48000,
                    channels: Some(2),
                    parameters: BTreeMap::new(),
                    rtcp_feedback: Vec::new(),
                },
                RtpCodecCapability {
                    kind: MediaKind::Video,
                    mime_type: MIME_TYPE_VP8.to_string(),
                    preferred_payload_type: None,
                    clock_rate: 90000,
                    channels: None,
                    parameters: BTreeMap::new(),
                    rtcp_feedback: Vec::new(),
                },
            ],
            listen_ip: "0.0.0.0".to_string(),
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            enable_udp: true,
            enable_tcp: true,
            prefer_udp: true,
        }
    }
}

impl TryFrom<&MediaConfig> for EngineConfig {
    type Error = SfuError;

    fn try_from(config: &MediaConfig) -> Result<Self> {
        let codecs = config
            .codecs
            .iter()
            .map(|codec| {
                let kind = MediaKind::try_from(RTPCodecType::from(codec.kind.as_str()))?;
                Ok(RtpCodecCapability {
                    kind,
                    mime_type: codec.mime_type.clone(),
                    preferred_payload_type: None,
                    clock_rate: codec.clock_rate,
                    channels: codec.channels,
                    parameters: codec.parameters.clone(),
                    rtcp_feedback: Vec::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            codecs,
            listen_ip: config.listen_ip.clone(),
            announced_ip: config.announced_ip.clone(),
            rtc_min_port: config.rtc_min_port,
            rtc_max_port: config.rtc_max_port,
            enable_udp: config.enable_udp,
            enable_tcp: config.enable_tcp,
            prefer_udp: config.prefer_udp,
        })
    }
}

struct TransportRecord {
    role: TransportRole,
    port: u16,
    connected: bool,
    producers: HashSet<ProducerId>,
    consumers: HashSet<ConsumerId>,
    next_mid: u32,
}

struct ProducerRecord {
    transport_id: TransportId,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    consumers: HashSet<ConsumerId>,
}

struct ConsumerRecord {
    transport_id: TransportId,
    producer_id: ProducerId,
    paused: bool,
}

#[derive(Default)]
struct EngineState {
    transports: HashMap<TransportId, TransportRecord>,
    producers: HashMap<ProducerId, ProducerRecord>,
    consumers: HashMap<ConsumerId, ConsumerRecord>,
    ports_in_use: HashSet<u16>,
    next_port: u16,
}

impl EngineState {
    fn allocate_port(&mut self, min: u16, max: u16) -> Option<u16> {
        let span = u32::from(max - min) + 1;
        let start = if (min..=max).contains(&self.next_port) {
            self.next_port
        } else {
            min
        };

        for offset in 0..span {
            let candidate = u32::from(start - min) + offset;
            let port = min + (candidate % span) as u16;
            if self.ports_in_use.insert(port) {
                self.next_port = if port == max { min } else { port + 1 };
                return Some(port);
            }
        }
        None
    }

    fn remove_consumer(&mut self, consumer_id: &ConsumerId) {
        if let Some(consumer) = self.consumers.remove(consumer_id) {
            if let Some(transport) = self.transports.get_mut(&consumer.transport_id) {
                transport.consumers.remove(consumer_id);
            }
            if let Some(producer) = self.producers.get_mut(&consumer.producer_id) {
                producer.consumers.remove(consumer_id);
            }
        }
    }

    fn remove_producer(&mut self, producer_id: &ProducerId) {
        if let Some(producer) = self.producers.remove(producer_id) {
            for consumer_id in &producer.consumers {
                self.remove_consumer(consumer_id);
            }
            if let Some(transport) = self.transports.get_mut(&producer.transport_id) {
                transport.producers.remove(producer_id);
            }
        }
    }

    fn remove_transport(&mut self, transport_id: &TransportId) -> Option<TransportRole> {
        let transport = self.transports.remove(transport_id)?;
        self.ports_in_use.remove(&transport.port);
        for producer_id in &transport.producers {
            self.remove_producer(producer_id);
        }
        for consumer_id in &transport.consumers {
            self.remove_consumer(consumer_id);
        }
        Some(transport.role)
    }
}

/// Media engine running inside the coordination process
pub struct LocalMediaEngine {
    config: EngineConfig,
    capabilities: RtpCapabilities,
    state: Mutex<EngineState>,
    died: CancellationToken,
}

impl LocalMediaEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let capabilities = router_capabilities(&config.codecs);

        info!(
            codecs = capabilities.codecs.len(),
            announced_ip = %config.announced_ip,
            rtc_min_port = config.rtc_min_port,
            rtc_max_port = config.rtc_max_port,
            "Media engine initialized"
        );

        Self {
            state: Mutex::new(EngineState {
                next_port: config.rtc_min_port,
                ..EngineState::default()
            }),
            config,
            capabilities,
            died: CancellationToken::new(),
        }
    }

    /// Terminate the engine; every object it holds is lost
    pub fn kill(&self) {
        if self.died.is_cancelled() {
            return;
        }
        error!("Media engine terminated");
        let mut state = self.state.lock();
        *state = EngineState::default();
        self.died.cancel();
    }

    /// `Some(true)` while the consumer exists and has not been resumed
    #[must_use]
    pub fn consumer_paused(&self, consumer_id: &ConsumerId) -> Option<bool> {
        self.state.lock().consumers.get(consumer_id).map(|c| c.paused)
    }

    #[must_use]
    pub fn transport_count(&self) -> usize {
        self.state.lock().transports.len()
    }

    #[must_use]
    pub fn producer_count(&self) -> usize {
        self.state.lock().producers.len()
    }

    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.state.lock().consumers.len()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.died.is_cancelled() {
            Err(SfuError::EngineProcessDied)
        } else {
            Ok(())
        }
    }

    fn ice_candidates(&self, port: u16) -> Vec<IceCandidate> {
        let (udp_priority, tcp_priority) = if self.config.prefer_udp {
            (UDP_CANDIDATE_PRIORITY, TCP_CANDIDATE_PRIORITY)
        } else {
            (TCP_CANDIDATE_PRIORITY, UDP_CANDIDATE_PRIORITY)
        };

        let mut candidates = Vec::with_capacity(2);
        if self.config.enable_udp {
            candidates.push(IceCandidate {
                foundation: "udpcandidate".to_string(),
                priority: udp_priority,
                ip: self.config.announced_ip.clone(),
                protocol: IceProtocol::Udp,
                port,
                candidate_type: "host".to_string(),
                tcp_type: None,
            });
        }
        if self.config.enable_tcp {
            candidates.push(IceCandidate {
                foundation: "tcpcandidate".to_string(),
                priority: tcp_priority,
                ip: self.config.announced_ip.clone(),
                protocol: IceProtocol::Tcp,
                port,
                candidate_type: "host".to_string(),
                tcp_type: Some("passive".to_string()),
            });
        }
        candidates
    }
}

#[async_trait]
impl MediaEngine for LocalMediaEngine {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.capabilities.clone()
    }

    async fn create_transport(&self, role: TransportRole) -> Result<TransportParams> {
        self.ensure_alive()?;

        let id = TransportId::generate();
        let port = {
            let mut state = self.state.lock();
            let port = state
                .allocate_port(self.config.rtc_min_port, self.config.rtc_max_port)
                .ok_or_else(|| SfuError::EngineFailure("no free RTC port".to_string()))?;
            state.transports.insert(
                id.clone(),
                TransportRecord {
                    role,
                    port,
                    connected: false,
                    producers: HashSet::new(),
                    consumers: HashSet::new(),
                    next_mid: 0,
                },
            );
            port
        };

        debug!(transport_id = %id, %role, port, listen_ip = %self.config.listen_ip, "Transport created");

        Ok(TransportParams {
            ice_parameters: IceParameters {
                username_fragment: nanoid::nanoid!(16),
                password: nanoid::nanoid!(32),
                ice_lite: true,
            },
            ice_candidates: self.ice_candidates(port),
            dtls_parameters: DtlsParameters {
                role: DtlsRole::Auto,
                fingerprints: vec![DtlsFingerprint {
                    algorithm: "sha-256".to_string(),
                    value: fingerprint(&id),
                }],
            },
            id,
        })
    }

    async fn connect_transport(&self, transport_id: &TransportId, dtls: DtlsParameters) -> Result<()> {
        self.ensure_alive()?;

        if dtls.fingerprints.is_empty() {
            return Err(SfuError::EngineFailure(
                "DTLS parameters carry no fingerprint".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let transport = state
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| SfuError::TransportNotFound(transport_id.clone()))?;
        if transport.connected {
            return Err(SfuError::EngineFailure(format!(
                "transport {transport_id} already connected"
            )));
        }
        transport.connected = true;

        debug!(transport_id = %transport_id, role = ?dtls.role, "Transport connected");
        Ok(())
    }

    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId> {
        self.ensure_alive()?;

        let media_codecs: Vec<_> = rtp_parameters.codecs.iter().filter(|c| !c.is_rtx()).collect();
        if media_codecs.is_empty() {
            return Err(SfuError::EngineFailure("RTP parameters carry no media codec".to_string()));
        }
        for codec in &media_codecs {
            if MediaKind::from_mime(&codec.mime_type) != Some(kind) {
                return Err(SfuError::EngineFailure(format!(
                    "codec {} does not carry {kind}",
                    codec.mime_type
                )));
            }
            if !self.capabilities.supports(codec) {
                return Err(SfuError::EngineFailure(format!(
                    "codec {} not supported by router",
                    codec.mime_type
                )));
            }
        }

        let mut state = self.state.lock();
        let transport = state
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| SfuError::TransportNotFound(transport_id.clone()))?;
        if !transport.connected {
            return Err(SfuError::EngineFailure(format!(
                "transport {transport_id} is not connected"
            )));
        }

        let id = ProducerId::generate();
        transport.producers.insert(id.clone());
        state.producers.insert(
            id.clone(),
            ProducerRecord {
                transport_id: transport_id.clone(),
                kind,
                rtp_parameters,
                consumers: HashSet::new(),
            },
        );

        debug!(producer_id = %id, transport_id = %transport_id, %kind, "Producer created");
        Ok(id)
    }

    fn can_consume(&self, producer_id: &ProducerId, capabilities: &RtpCapabilities) -> bool {
        if self.died.is_cancelled() {
            return false;
        }
        let state = self.state.lock();
        state.producers.get(producer_id).is_some_and(|producer| {
            producer
                .rtp_parameters
                .codecs
                .iter()
                .any(|codec| !codec.is_rtx() && capabilities.supports(codec))
        })
    }

    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        capabilities: &RtpCapabilities,
    ) -> Result<ConsumerParams> {
        self.ensure_alive()?;

        let mut state = self.state.lock();
        let producer = state
            .producers
            .get(producer_id)
            .ok_or_else(|| SfuError::ProducerNotFound(producer_id.clone()))?;
        let kind = producer.kind;
        let rtp_parameters = consumer_rtp_parameters(&producer.rtp_parameters, capabilities)
            .ok_or_else(|| {
                SfuError::IncompatibleCapabilities(format!(
                    "no common codec for producer {producer_id}"
                ))
            })?;

        let transport = state
            .transports
            .get_mut(transport_id)
            .ok_or_else(|| SfuError::TransportNotFound(transport_id.clone()))?;
        let id = ConsumerId::generate();
        let mid = transport.next_mid;
        transport.next_mid += 1;
        transport.consumers.insert(id.clone());

        if let Some(producer) = state.producers.get_mut(producer_id) {
            producer.consumers.insert(id.clone());
        }
        state.consumers.insert(
            id.clone(),
            ConsumerRecord {
                transport_id: transport_id.clone(),
                producer_id: producer_id.clone(),
                paused: true,
            },
        );

        debug!(consumer_id = %id, producer_id = %producer_id, transport_id = %transport_id, "Consumer created paused");

        Ok(ConsumerParams {
            id,
            producer_id: producer_id.clone(),
            kind,
            rtp_parameters: RtpParameters {
                mid: Some(mid.to_string()),
                ..rtp_parameters
            },
            paused: true,
        })
    }

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<()> {
        self.ensure_alive()?;

        let mut state = self.state.lock();
        let consumer = state
            .consumers
            .get_mut(consumer_id)
            .ok_or_else(|| SfuError::ConsumerNotFound(consumer_id.clone()))?;
        consumer.paused = false;

        debug!(consumer_id = %consumer_id, "Consumer resumed");
        Ok(())
    }

    async fn close_transport(&self, transport_id: &TransportId) {
        if let Some(role) = self.state.lock().remove_transport(transport_id) {
            debug!(transport_id = %transport_id, %role, "Transport closed");
        }
    }

    async fn close_producer(&self, producer_id: &ProducerId) {
        self.state.lock().remove_producer(producer_id);
    }

    async fn close_consumer(&self, consumer_id: &ConsumerId) {
        self.state.lock().remove_consumer(consumer_id);
    }

    fn died(&self) -> CancellationToken {
        self.died.clone()
    }
}

/// Router capabilities with a payload type assigned to every codec
fn router_capabilities(codecs: &[RtpCodecCapability]) -> RtpCapabilities {
    let taken: HashSet<u8> = codecs.iter().filter_map(|c| c.preferred_payload_type).collect();
    let mut next = DYNAMIC_PAYLOAD_TYPE_START;

    let codecs = codecs
        .iter()
        .map(|codec| {
            let mut codec = codec.clone();
            if codec.preferred_payload_type.is_none() {
                while taken.contains(&next) {
                    next += 1;
                }
                codec.preferred_payload_type = Some(next);
                next += 1;
            }
            codec
        })
        .collect();

    RtpCapabilities {
        codecs,
        header_extensions: Vec::new(),
    }
}

/// Producer parameters narrowed to what the receiving device supports.
/// Retransmission codecs are kept only alongside the media codec they repair.
fn consumer_rtp_parameters(
    producer: &RtpParameters,
    capabilities: &RtpCapabilities,
) -> Option<RtpParameters> {
    let media: Vec<RtpCodecParameters> = producer
        .codecs
        .iter()
        .filter(|c| !c.is_rtx() && capabilities.supports(c))
        .cloned()
        .collect();
    if media.is_empty() {
        return None;
    }

    let kept: HashSet<u64> = media.iter().map(|c| u64::from(c.payload_type)).collect();
    let rtx = producer.codecs.iter().filter(|c| {
        c.is_rtx()
            && c.parameters
                .get("apt")
                .and_then(serde_json::Value::as_u64)
                .is_some_and(|apt| kept.contains(&apt))
    });

    let ssrc = (uuid::Uuid::new_v4().as_u128() & u128::from(u32::MAX)) as u32;

    Some(RtpParameters {
        mid: None,
        codecs: media.iter().cloned().chain(rtx.cloned()).collect(),
        encodings: vec![json!({ "ssrc": ssrc })],
        header_extensions: Vec::new(),
        extra: producer.extra.clone(),
    })
}

/// sha-256 fingerprint in the colon-separated uppercase form used in SDP
fn fingerprint(transport_id: &TransportId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(transport_id.as_str().as_bytes());
    hasher.update(nanoid::nanoid!(32).as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dtls() -> DtlsParameters {
        DtlsParameters {
            role: DtlsRole::Client,
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".to_string(),
                value: "AA:BB".to_string(),
            }],
        }
    }

    fn vp8_parameters() -> RtpParameters {
        RtpParameters {
            mid: Some("0".to_string()),
            codecs: vec![
                RtpCodecParameters {
                    mime_type: "video/VP8".to_string(),
                    payload_type: 96,
                    clock_rate: 90000,
                    channels: None,
                    parameters: BTreeMap::new(),
                    rtcp_feedback: Vec::new(),
                },
                RtpCodecParameters {
                    mime_type: "video/rtx".to_string(),
                    payload_type: 97,
                    clock_rate: 90000,
                    channels: None,
                    parameters: BTreeMap::from([("apt".to_string(), json!(96))]),
                    rtcp_feedback: Vec::new(),
                },
            ],
            ..RtpParameters::default()
        }
    }

    #[test]
    fn test_router_capabilities_assign_payload_types() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let caps = engine.rtp_capabilities();
        assert_eq!(caps.codecs.len(), 2);
        assert_eq!(caps.codecs[0].preferred_payload_type, Some(100));
        assert_eq!(caps.codecs[1].preferred_payload_type, Some(101));
    }

    #[test]
    fn test_port_allocation_wraps_and_exhausts() {
        let mut state = EngineState {
            next_port: 10,
            ..EngineState::default()
        };
        assert_eq!(state.allocate_port(10, 11), Some(10));
        assert_eq!(state.allocate_port(10, 11), Some(11));
        assert_eq!(state.allocate_port(10, 11), None);

        state.ports_in_use.remove(&10);
        assert_eq!(state.allocate_port(10, 11), Some(10));
    }

    #[tokio::test]
    async fn test_transport_params() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let params = engine.create_transport(TransportRole::Upload).await.unwrap();

        assert_eq!(params.ice_candidates.len(), 2);
        assert_eq!(params.ice_candidates[0].protocol, IceProtocol::Udp);
        assert!(params.ice_candidates[0].priority > params.ice_candidates[1].priority);
        assert_eq!(params.ice_candidates[0].port, 40000);
        assert_eq!(params.dtls_parameters.fingerprints[0].value.len(), 32 * 3 - 1);
    }

    #[tokio::test]
    async fn test_produce_requires_connected_transport() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let transport = engine.create_transport(TransportRole::Upload).await.unwrap();

        let err = engine
            .produce(&transport.id, MediaKind::Video, vp8_parameters())
            .await
            .unwrap_err();
        assert!(matches!(err, SfuError::EngineFailure(_)));

        engine.connect_transport(&transport.id, dtls()).await.unwrap();
        assert!(engine.connect_transport(&transport.id, dtls()).await.is_err());
        engine
            .produce(&transport.id, MediaKind::Video, vp8_parameters())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_produce_rejects_kind_mismatch() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let transport = engine.create_transport(TransportRole::Upload).await.unwrap();
        engine.connect_transport(&transport.id, dtls()).await.unwrap();

        let err = engine
            .produce(&transport.id, MediaKind::Audio, vp8_parameters())
            .await
            .unwrap_err();
        assert!(matches!(err, SfuError::EngineFailure(_)));
    }

    #[tokio::test]
    async fn test_consume_is_paused_and_filters_codecs() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let send = engine.create_transport(TransportRole::Upload).await.unwrap();
        engine.connect_transport(&send.id, dtls()).await.unwrap();
        let producer = engine
            .produce(&send.id, MediaKind::Video, vp8_parameters())
            .await
            .unwrap();

        let recv = engine.create_transport(TransportRole::Download).await.unwrap();
        let caps = engine.rtp_capabilities();
        assert!(engine.can_consume(&producer, &caps));

        let consumer = engine.consume(&recv.id, &producer, &caps).await.unwrap();
        assert!(consumer.paused);
        assert_eq!(consumer.kind, MediaKind::Video);
        assert_eq!(consumer.rtp_parameters.codecs.len(), 2);
        assert_eq!(engine.consumer_paused(&consumer.id), Some(true));

        engine.resume_consumer(&consumer.id).await.unwrap();
        assert_eq!(engine.consumer_paused(&consumer.id), Some(false));
    }

    #[tokio::test]
    async fn test_can_consume_rejects_unsupported_capabilities() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let send = engine.create_transport(TransportRole::Upload).await.unwrap();
        engine.connect_transport(&send.id, dtls()).await.unwrap();
        let producer = engine
            .produce(&send.id, MediaKind::Video, vp8_parameters())
            .await
            .unwrap();

        let audio_only = RtpCapabilities {
            codecs: engine
                .rtp_capabilities()
                .codecs
                .into_iter()
                .filter(|c| c.kind == MediaKind::Audio)
                .collect(),
            header_extensions: Vec::new(),
        };
        assert!(!engine.can_consume(&producer, &audio_only));
        assert!(!engine.can_consume(&ProducerId::from("missing"), &engine.rtp_capabilities()));
    }

    #[tokio::test]
    async fn test_close_transport_cascades() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let send = engine.create_transport(TransportRole::Upload).await.unwrap();
        engine.connect_transport(&send.id, dtls()).await.unwrap();
        let producer = engine
            .produce(&send.id, MediaKind::Video, vp8_parameters())
            .await
            .unwrap();
        let recv = engine.create_transport(TransportRole::Download).await.unwrap();
        let consumer = engine
            .consume(&recv.id, &producer, &engine.rtp_capabilities())
            .await
            .unwrap();

        engine.close_transport(&send.id).await;
        assert_eq!(engine.producer_count(), 0);
        assert_eq!(engine.consumer_paused(&consumer.id), None);
        assert_eq!(engine.transport_count(), 1);

        // closing again is a no-op
        engine.close_transport(&send.id).await;
    }

    #[tokio::test]
    async fn test_killed_engine_refuses_work() {
        let engine = LocalMediaEngine::new(EngineConfig::default());
        let died = engine.died();
        engine.kill();

        assert!(died.is_cancelled());
        assert_eq!(
            engine.create_transport(TransportRole::Upload).await.unwrap_err(),
            SfuError::EngineProcessDied
        );
    }

    #[test]
    fn test_engine_config_from_media_config() {
        let config = EngineConfig::try_from(&MediaConfig::default()).unwrap();
        assert_eq!(config.codecs[0].kind, MediaKind::Audio);
        assert_eq!(config.codecs[1].mime_type, "video/VP8");
        assert_eq!(config.rtc_min_port, 40000);
    }
}
