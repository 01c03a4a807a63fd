//! Session and signaling coordination for a selective forwarding unit
//!
//! This crate holds the authoritative state of rooms, peers and the media
//! objects they own, and drives a [`MediaEngine`] through the signaling
//! protocol:
//! - [`PeerRegistry`]: connected peers and their transports, producers and consumers
//! - [`RoomIndex`]: room membership and room-name reservations
//! - [`SessionCoordinator`]: the per-peer protocol state machine and fan-out
//! - [`SignalingSession`]: one connection's request loop
//! - [`LocalMediaEngine`]: in-process implementation of the engine facade

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod session;
pub mod types;

pub use config::SfuConfig;
pub use coordinator::{PeerSnapshot, SessionCoordinator};
pub use engine::{EngineConfig, LocalMediaEngine, MediaEngine};
pub use error::{Result, SfuError};
pub use peer::{PeerOutbox, PeerState};
pub use protocol::{ClientFrame, ClientRequest, Notification, ServerMessage};
pub use registry::PeerRegistry;
pub use room::RoomIndex;
pub use session::{SignalingSession, SignalingStream};
pub use types::{ConsumerId, MediaKind, PeerId, ProducerId, RoomName, TransportId, TransportRole};
