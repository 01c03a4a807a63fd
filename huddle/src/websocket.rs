//! Signaling over WebSocket
//!
//! One WebSocket connection is one peer. Inbound text frames feed a
//! `SignalingSession`; everything the session or the coordinator queues for
//! the peer is serialized to JSON by a dedicated writer task.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use huddle_sfu::{PeerId, PeerOutbox, ServerMessage, SignalingSession, SignalingStream};

use crate::http::AppState;

/// Adapts the receiving half of a WebSocket to `SignalingStream`
struct WebSocketStream {
    receiver: SplitStream<WebSocket>,
}

#[async_trait::async_trait]
impl SignalingStream for WebSocketStream {
    async fn recv(&mut self) -> Option<Result<String, String>> {
        loop {
            match self.receiver.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => return Some(Err(format!("WebSocket error: {e}"))),
                // Binary, ping and pong frames carry no signaling
                Some(Ok(_)) => {}
            }
        }
    }
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_message_size = state.server.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize queued messages onto the socket until the queue closes or a send
/// fails. Returns the number of frames written.
async fn write_messages<S>(mut sink: S, mut rx: mpsc::Receiver<ServerMessage>, peer_id: PeerId) -> usize
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut written = 0;
    while let Some(message) = rx.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                error!(peer_id = %peer_id, error = %e, "Failed to encode signaling message");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            debug!(peer_id = %peer_id, error = %e, "Failed to send WebSocket message");
            break;
        }
        written += 1;
    }
    if let Err(e) = sink.close().await {
        debug!(peer_id = %peer_id, error = %e, "Failed to close WebSocket");
    }
    written
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let peer_id = PeerId::generate();
    let (outbox, rx) = PeerOutbox::channel(peer_id.clone(), state.server.outbound_queue);

    let session = match SignalingSession::open(state.coordinator.clone(), peer_id.clone(), outbox) {
        Ok(session) => session,
        Err(e) => {
            error!(peer_id = %peer_id, error = %e, "Failed to register peer");
            return;
        }
    };

    info!(peer_id = %peer_id, "WebSocket connection established");

    let (sink, receiver) = socket.split();
    let writer = tokio::spawn(write_messages(sink, rx, peer_id.clone()));

    let mut stream = WebSocketStream { receiver };
    session.run(&mut stream).await;

    // Last sender for this peer; the writer drains what is queued and stops
    drop(session);
    match writer.await {
        Ok(written) => debug!(peer_id = %peer_id, written, "WebSocket writer finished"),
        Err(e) => error!(peer_id = %peer_id, error = %e, "WebSocket writer task failed"),
    }

    info!(peer_id = %peer_id, "WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use huddle_sfu::Notification;

    /// Records frames; closing always fails
    #[derive(Default)]
    struct BrokenCloseSink {
        frames: Vec<Message>,
    }

    impl Sink<Message> for BrokenCloseSink {
        type Error = String;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.frames.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Err("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_writer_survives_failed_close() {
        let (tx, rx) = mpsc::channel(4);
        let peer_id = PeerId::from("a");
        tx.send(ServerMessage::Notification(Notification::PeerClosed {
            peer_id: PeerId::from("b"),
        }))
        .await
        .unwrap();
        drop(tx);

        let mut sink = BrokenCloseSink::default();
        let written = write_messages(&mut sink, rx, peer_id).await;

        assert_eq!(written, 1);
        assert_eq!(
            sink.frames,
            vec![Message::Text(
                r#"{"event":"peerClosed","data":{"peerId":"b"}}"#.into()
            )]
        );
    }
}
