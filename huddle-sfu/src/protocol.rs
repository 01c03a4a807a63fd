//! Signaling wire protocol
//!
//! Frames are JSON objects. Requests carry an optional correlation `id`, the
//! `event` name and the payload fields inline:
//!
//! ```json
//! {"id": 3, "event": "joinRoom", "roomName": "r1"}
//! ```
//!
//! Replies echo the id with either `data` or `error`; pushes carry `event`
//! and `data` and no id.

use serde::{Deserialize, Serialize};

use crate::engine::{ConsumerParams, DtlsParameters, RtpCapabilities, RtpParameters, TransportParams};
use crate::error::SfuError;
use crate::types::{ConsumerId, MediaKind, PeerId, ProducerId, RoomName, TransportId, TransportRole};

/// One inbound frame
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    /// Correlation id; requests without one get no reply
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub request: ClientRequest,
}

impl ClientFrame {
    /// Decode a text frame. On failure the correlation id is recovered when
    /// the frame is at least a JSON object carrying one.
    pub fn parse(text: &str) -> Result<Self, (Option<u64>, SfuError)> {
        serde_json::from_str::<Self>(text).map_err(|e| {
            let id = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("id").and_then(serde_json::Value::as_u64));
            (id, SfuError::Malformed(e.to_string()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event")]
pub enum ClientRequest {
    #[serde(rename = "generateRandomRoomName")]
    GenerateRandomRoomName,

    #[serde(rename = "joinRoom", rename_all = "camelCase")]
    JoinRoom { room_name: String },

    /// `role` is preferred; `consumer: true|false` is accepted from older clients
    #[serde(rename = "createWebRtcTransport")]
    CreateWebRtcTransport {
        #[serde(default)]
        role: Option<TransportRole>,
        #[serde(default)]
        consumer: Option<bool>,
    },

    #[serde(rename = "transport-connect", rename_all = "camelCase")]
    TransportConnect {
        transport_id: TransportId,
        #[serde(alias = "handshakeParams")]
        dtls_parameters: DtlsParameters,
    },

    #[serde(rename = "transport-produce", rename_all = "camelCase")]
    TransportProduce {
        transport_id: TransportId,
        kind: MediaKind,
        #[serde(alias = "mediaParams")]
        rtp_parameters: RtpParameters,
    },

    #[serde(rename = "transport-recv-connect", rename_all = "camelCase")]
    TransportRecvConnect {
        transport_id: TransportId,
        #[serde(alias = "handshakeParams")]
        dtls_parameters: DtlsParameters,
    },

    #[serde(rename = "consume", rename_all = "camelCase")]
    Consume {
        transport_id: TransportId,
        remote_producer_id: ProducerId,
        #[serde(alias = "capabilities")]
        rtp_capabilities: RtpCapabilities,
    },

    #[serde(rename = "consumer-resume", rename_all = "camelCase")]
    ConsumerResume { consumer_id: ConsumerId },
}

impl ClientRequest {
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::GenerateRandomRoomName => "generateRandomRoomName",
            Self::JoinRoom { .. } => "joinRoom",
            Self::CreateWebRtcTransport { .. } => "createWebRtcTransport",
            Self::TransportConnect { .. } => "transport-connect",
            Self::TransportProduce { .. } => "transport-produce",
            Self::TransportRecvConnect { .. } => "transport-recv-connect",
            Self::Consume { .. } => "consume",
            Self::ConsumerResume { .. } => "consumer-resume",
        }
    }
}

/// Role requested by `createWebRtcTransport`
pub fn requested_role(role: Option<TransportRole>, consumer: Option<bool>) -> Result<TransportRole, SfuError> {
    match (role, consumer) {
        (Some(role), _) => Ok(role),
        (None, Some(true)) => Ok(TransportRole::Download),
        (None, Some(false)) => Ok(TransportRole::Upload),
        (None, None) => Err(SfuError::Malformed(
            "createWebRtcTransport needs a role".to_string(),
        )),
    }
}

/// Producers of one room-mate at the moment of joining
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub peer_id: PeerId,
    pub producer_ids: Vec<ProducerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub capabilities: RtpCapabilities,
    pub manifest: Vec<ManifestEntry>,
}

/// Success payload of a reply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    #[serde(rename_all = "camelCase")]
    RoomName { room_name: RoomName },
    Joined(JoinResponse),
    #[serde(rename_all = "camelCase")]
    Transport { transport_params: TransportParams },
    #[serde(rename_all = "camelCase")]
    Produced { producer_id: ProducerId },
    #[serde(rename_all = "camelCase")]
    Consumed { consumer_params: ConsumerParams },
    Ack {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&SfuError> for ErrorBody {
    fn from(err: &SfuError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReplyOutcome {
    #[serde(rename = "data")]
    Data(ResponseData),
    #[serde(rename = "error")]
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

/// Unsolicited push to a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Notification {
    /// A room-mate published a new stream
    #[serde(rename = "newProducer", rename_all = "camelCase")]
    NewProducer { producer_id: ProducerId, peer_id: PeerId },

    /// A room-mate disconnected; its consumers should be released
    #[serde(rename = "peerClosed", rename_all = "camelCase")]
    PeerClosed { peer_id: PeerId },
}

/// Anything the server writes to a peer's connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Reply(Reply),
    Notification(Notification),
}

impl ServerMessage {
    #[must_use]
    pub fn reply(id: u64, result: &Result<ResponseData, SfuError>) -> Self {
        let outcome = match result {
            Ok(data) => ReplyOutcome::Data(data.clone()),
            Err(err) => ReplyOutcome::Error(ErrorBody::from(err)),
        };
        Self::Reply(Reply { id, outcome })
    }
}
