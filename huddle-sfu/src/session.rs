//! Per-connection signaling loop
//!
//! A [`SignalingSession`] owns one peer for the lifetime of its connection.
//! Frames are handled one at a time in arrival order, so a reply always
//! follows its own request and requests from the same peer never race each
//! other. When the stream ends the peer is disconnected unconditionally,
//! even while a request is still waiting on the media engine.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use huddle_core::metrics;

use crate::coordinator::SessionCoordinator;
use crate::error::{Result, SfuError};
use crate::peer::PeerOutbox;
use crate::protocol::{requested_role, ClientFrame, ClientRequest, ResponseData, ServerMessage};
use crate::types::{PeerId, TransportRole};

/// Requests accepted while one is pending before the peer is dropped
const MAX_BACKLOG: usize = 32;

/// How long a pending request may still run once its peer is gone
const IN_FLIGHT_GRACE: Duration = Duration::from_secs(5);

/// Inbound half of a peer's connection
#[async_trait]
pub trait SignalingStream: Send {
    /// Next text frame. `None` once the connection is closed.
    ///
    /// Must be cancel safe: the session drops a pending `recv` whenever a
    /// request completes first.
    async fn recv(&mut self) -> Option<std::result::Result<String, String>>;
}

/// Why the wait on a pending request ended
enum Interrupt {
    Done(Option<ServerMessage>),
    EngineDied,
    Lagged,
    Closed,
}

pub struct SignalingSession {
    peer_id: PeerId,
    coordinator: Arc<SessionCoordinator>,
    outbox: PeerOutbox,
}

impl SignalingSession {
    /// Register the peer with the coordinator
    pub fn open(coordinator: Arc<SessionCoordinator>, peer_id: PeerId, outbox: PeerOutbox) -> Result<Self> {
        coordinator.connect(peer_id.clone(), outbox.clone())?;
        Ok(Self {
            peer_id,
            coordinator,
            outbox,
        })
    }

    #[must_use]
    pub const fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Process frames until the stream closes or the engine dies, then clean up.
    ///
    /// The stream keeps being read while a request is pending, so a lost
    /// connection tears the peer down even if the engine never answers.
    /// Frames arriving meanwhile are queued and handled in order.
    pub async fn run<S: SignalingStream>(&self, stream: &mut S) {
        let engine_died = self.coordinator.engine_died();
        let lagged = self.outbox.lagged();
        let mut backlog: VecDeque<String> = VecDeque::new();

        loop {
            let text = match backlog.pop_front() {
                Some(text) => text,
                None => tokio::select! {
                    () = engine_died.cancelled() => {
                        warn!(peer_id = %self.peer_id, "Media engine died, closing session");
                        break;
                    }
                    () = lagged.cancelled() => {
                        warn!(peer_id = %self.peer_id, "Peer fell behind on notifications, closing session");
                        break;
                    }
                    frame = stream.recv() => match self.accept(frame) {
                        Some(text) => text,
                        None => break,
                    },
                },
            };

            let handling = self.handle_text(&text);
            tokio::pin!(handling);

            let interrupt = loop {
                tokio::select! {
                    biased;
                    reply = &mut handling => break Interrupt::Done(reply),
                    () = engine_died.cancelled() => break Interrupt::EngineDied,
                    () = lagged.cancelled() => break Interrupt::Lagged,
                    frame = stream.recv() => match self.accept(frame) {
                        Some(next) if backlog.len() < MAX_BACKLOG => backlog.push_back(next),
                        Some(_) => {
                            warn!(
                                peer_id = %self.peer_id,
                                limit = MAX_BACKLOG,
                                "Too many requests queued behind a pending one"
                            );
                            break Interrupt::Closed;
                        }
                        None => break Interrupt::Closed,
                    },
                }
            };

            match interrupt {
                Interrupt::Done(Some(reply)) => {
                    if !self.outbox.send(reply).await {
                        debug!(peer_id = %self.peer_id, "Connection writer gone");
                        break;
                    }
                }
                Interrupt::Done(None) => {}
                Interrupt::EngineDied => {
                    warn!(peer_id = %self.peer_id, "Media engine died, closing session");
                    break;
                }
                Interrupt::Lagged => {
                    warn!(peer_id = %self.peer_id, "Peer fell behind on notifications, closing session");
                    self.finish_after_disconnect(handling).await;
                    break;
                }
                Interrupt::Closed => {
                    self.finish_after_disconnect(handling).await;
                    break;
                }
            }
        }

        self.coordinator.disconnect(&self.peer_id).await;
    }

    fn accept(&self, frame: Option<std::result::Result<String, String>>) -> Option<String> {
        match frame {
            Some(Ok(text)) => Some(text),
            Some(Err(e)) => {
                warn!(peer_id = %self.peer_id, error = %e, "Error receiving frame");
                None
            }
            None => {
                info!(peer_id = %self.peer_id, "Client disconnected");
                None
            }
        }
    }

    /// Tear the peer down, then give the pending request a bounded chance to
    /// finish so whatever the engine creates late is closed again
    async fn finish_after_disconnect<F>(&self, pending: Pin<&mut F>)
    where
        F: Future<Output = Option<ServerMessage>>,
    {
        self.coordinator.disconnect(&self.peer_id).await;
        if tokio::time::timeout(IN_FLIGHT_GRACE, pending).await.is_err() {
            warn!(
                peer_id = %self.peer_id,
                grace_secs = IN_FLIGHT_GRACE.as_secs(),
                "Abandoning request still pending after disconnect"
            );
        }
    }

    /// Handle one text frame; returns the reply when the request carried an id
    pub async fn handle_text(&self, text: &str) -> Option<ServerMessage> {
        let frame = match ClientFrame::parse(text) {
            Ok(frame) => frame,
            Err((id, err)) => {
                warn!(peer_id = %self.peer_id, error = %err, "Malformed signaling frame");
                metrics::SIGNALING_ERRORS.with_label_values(&[err.code()]).inc();
                return id.map(|id| ServerMessage::reply(id, &Err(err)));
            }
        };

        let event = frame.request.event_name();
        metrics::SIGNALING_MESSAGES.with_label_values(&[event]).inc();
        debug!(peer_id = %self.peer_id, event, id = ?frame.id, "Signaling request");

        let result = self.dispatch(frame.request).await;
        if let Err(err) = &result {
            self.log_failure(event, err);
            metrics::SIGNALING_ERRORS.with_label_values(&[err.code()]).inc();
        }

        frame.id.map(|id| ServerMessage::reply(id, &result))
    }

    pub async fn dispatch(&self, request: ClientRequest) -> Result<ResponseData> {
        let coordinator = &self.coordinator;
        let peer_id = &self.peer_id;

        match request {
            ClientRequest::GenerateRandomRoomName => Ok(ResponseData::RoomName {
                room_name: coordinator.generate_room_name()?,
            }),
            ClientRequest::JoinRoom { room_name } => {
                coordinator.join(peer_id, &room_name).map(ResponseData::Joined)
            }
            ClientRequest::CreateWebRtcTransport { role, consumer } => {
                let role = requested_role(role, consumer)?;
                let transport_params = coordinator.create_transport(peer_id, role).await?;
                Ok(ResponseData::Transport { transport_params })
            }
            ClientRequest::TransportConnect {
                transport_id,
                dtls_parameters,
            } => {
                coordinator
                    .connect_transport(peer_id, &transport_id, TransportRole::Upload, dtls_parameters)
                    .await?;
                Ok(ResponseData::Ack {})
            }
            ClientRequest::TransportRecvConnect {
                transport_id,
                dtls_parameters,
            } => {
                coordinator
                    .connect_transport(peer_id, &transport_id, TransportRole::Download, dtls_parameters)
                    .await?;
                Ok(ResponseData::Ack {})
            }
            ClientRequest::TransportProduce {
                transport_id,
                kind,
                rtp_parameters,
            } => {
                let producer_id = coordinator
                    .produce(peer_id, &transport_id, kind, rtp_parameters)
                    .await?;
                Ok(ResponseData::Produced { producer_id })
            }
            ClientRequest::Consume {
                transport_id,
                remote_producer_id,
                rtp_capabilities,
            } => {
                let consumer_params = coordinator
                    .consume(peer_id, &transport_id, &remote_producer_id, &rtp_capabilities)
                    .await?;
                Ok(ResponseData::Consumed { consumer_params })
            }
            ClientRequest::ConsumerResume { consumer_id } => {
                coordinator.resume_consumer(peer_id, &consumer_id).await?;
                Ok(ResponseData::Ack {})
            }
        }
    }

    fn log_failure(&self, event: &str, err: &SfuError) {
        match err {
            SfuError::EngineFailure(_) | SfuError::EngineProcessDied => {
                error!(peer_id = %self.peer_id, event, code = err.code(), error = %err, "Request failed");
            }
            _ if err.is_benign_race() => {
                warn!(peer_id = %self.peer_id, event, code = err.code(), error = %err, "Request raced with teardown");
            }
            _ => {
                warn!(peer_id = %self.peer_id, event, code = err.code(), error = %err, "Request rejected");
            }
        }
    }
}
