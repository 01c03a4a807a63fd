//! Error taxonomy of the coordination layer

use thiserror::Error;

use crate::types::{ConsumerId, PeerId, ProducerId, TransportId, TransportRole};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SfuError {
    #[error("Peer already registered: {0}")]
    DuplicateIdentity(PeerId),

    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),

    #[error("Transport not found: {0}")]
    TransportNotFound(TransportId),

    #[error("Consumer not found: {0}")]
    ConsumerNotFound(ConsumerId),

    #[error("Producer not found: {0}")]
    ProducerNotFound(ProducerId),

    #[error("Transport {id} is a {actual} transport, expected {expected}")]
    WrongTransportRole {
        id: TransportId,
        expected: TransportRole,
        actual: TransportRole,
    },

    #[error("Incompatible capabilities: {0}")]
    IncompatibleCapabilities(String),

    #[error("Peer has not joined a room")]
    NotJoined,

    #[error("Peer already joined room {0}")]
    AlreadyJoined(String),

    #[error("Invalid room name: {0}")]
    InvalidRoomName(String),

    #[error("No free room name of length {0}")]
    RoomNamesExhausted(usize),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Media engine failure: {0}")]
    EngineFailure(String),

    #[error("Media engine process died")]
    EngineProcessDied,
}

impl SfuError {
    /// Stable code carried in structured error replies
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DuplicateIdentity(_) => "DUPLICATE_IDENTITY",
            Self::PeerNotFound(_) => "PEER_NOT_FOUND",
            Self::TransportNotFound(_) => "TRANSPORT_NOT_FOUND",
            Self::ConsumerNotFound(_) => "CONSUMER_NOT_FOUND",
            Self::ProducerNotFound(_) => "PRODUCER_NOT_FOUND",
            Self::WrongTransportRole { .. } => "WRONG_TRANSPORT_ROLE",
            Self::IncompatibleCapabilities(_) => "INCOMPATIBLE_CAPABILITIES",
            Self::NotJoined => "NOT_JOINED",
            Self::AlreadyJoined(_) => "ALREADY_JOINED",
            Self::InvalidRoomName(_) => "INVALID_ROOM_NAME",
            Self::RoomNamesExhausted(_) => "ROOM_NAMES_EXHAUSTED",
            Self::Malformed(_) => "MALFORMED",
            Self::EngineFailure(_) => "ENGINE_FAILURE",
            Self::EngineProcessDied => "ENGINE_PROCESS_DIED",
        }
    }

    /// Races with teardown on either side; logged at warn, never treated as failures
    #[must_use]
    pub const fn is_benign_race(&self) -> bool {
        matches!(
            self,
            Self::PeerNotFound(_) | Self::TransportNotFound(_) | Self::ConsumerNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SfuError>;
