//! Media engine facade
//!
//! The coordinator never touches packets, ICE or DTLS itself. It drives a
//! [`MediaEngine`], which owns routers, transports, producers and consumers
//! and negotiates their low-level parameters. Every call may suspend.

mod local;
mod rtp;

pub use local::{EngineConfig, LocalMediaEngine};
pub use rtp::{
    ConsumerParams, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters,
    IceProtocol, RtpCapabilities, RtpCodecCapability, RtpCodecParameters, RtpParameters,
    TransportParams,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{ConsumerId, MediaKind, ProducerId, TransportId, TransportRole};

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Capabilities of the router every peer negotiates against
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Allocate a transport and return its connection parameters
    async fn create_transport(&self, role: TransportRole) -> Result<TransportParams>;

    /// Complete the DTLS handshake parameters of a transport
    async fn connect_transport(&self, transport_id: &TransportId, dtls: DtlsParameters) -> Result<()>;

    /// Start receiving a stream from the peer on `transport_id`
    async fn produce(
        &self,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId>;

    /// Whether a device with `capabilities` can receive `producer_id`
    fn can_consume(&self, producer_id: &ProducerId, capabilities: &RtpCapabilities) -> bool;

    /// Create a paused consumer of `producer_id` on `transport_id`
    async fn consume(
        &self,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        capabilities: &RtpCapabilities,
    ) -> Result<ConsumerParams>;

    async fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<()>;

    /// Close a transport and everything it carries. Unknown ids are ignored.
    async fn close_transport(&self, transport_id: &TransportId);

    /// Close a producer and its consumers. Unknown ids are ignored.
    async fn close_producer(&self, producer_id: &ProducerId);

    /// Close a consumer. Unknown ids are ignored.
    async fn close_consumer(&self, consumer_id: &ConsumerId);

    /// Cancelled when the engine dies; nothing the engine holds survives it
    fn died(&self) -> CancellationToken;
}
