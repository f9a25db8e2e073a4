//! WebSocket connection handler
//!
//! One connection at a time is the live subscriber. Attaching sends the full
//! roster straight away; after that the connection only forwards whatever the
//! publisher and the log mirror queue for it.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::publisher::UpdatePublisher;
use crate::push::protocol::ClientMessage;
use crate::push::subscriber::SubscriberSlot;

/// Handle a single WebSocket connection
pub async fn handle_connection(
    stream: TcpStream,
    path: Arc<str>,
    publisher: UpdatePublisher,
    cancel: CancellationToken,
) {
    let addr = stream.peer_addr().ok();
    tracing::debug!("New connection from {:?}", addr);

    let expected = Arc::clone(&path);
    let check_path = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if req.uri().path() == &*expected {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some("not found".to_string()));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        }
    };

    let ws = match accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!("WebSocket handshake from {:?} failed: {}", addr, e);
            return;
        }
    };

    let mut conn = ConnectionState::attach(ws, publisher, cancel);
    tracing::info!("Subscriber {} connected", conn.id);
    conn.run().await;
    conn.detach();

    tracing::info!("Connection closed from {:?}", addr);
}

/// State for the attached connection
struct ConnectionState {
    ws: WebSocketStream<TcpStream>,
    id: String,
    slot: Arc<SubscriberSlot>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl ConnectionState {
    fn attach(
        ws: WebSocketStream<TcpStream>,
        publisher: UpdatePublisher,
        cancel: CancellationToken,
    ) -> Self {
        let id = format!("sub_{}", uuid::Uuid::new_v4().simple());
        let (tx, outbound) = mpsc::unbounded_channel();
        let slot = Arc::clone(publisher.subscriber());
        slot.attach(id.clone(), tx);

        // Handshake: the client sees the roster without waiting for a change
        publisher.push_roster();

        Self {
            ws,
            id,
            slot,
            outbound,
            cancel,
        }
    }

    async fn run(&mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = self.ws.close(None).await;
                    break;
                }

                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_message(text).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = self.ws.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::debug!("Subscriber {} requested close", self.id);
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket error on {}: {}", self.id, e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                queued = self.outbound.recv() => {
                    match queued {
                        Some(text) => {
                            if let Err(e) = self.ws.send(Message::Text(text)).await {
                                tracing::warn!("Dropping subscriber {}: {}", self.id, e);
                                break;
                            }
                        }
                        // Replaced by a newer connection
                        None => {
                            tracing::info!("Subscriber {} superseded", self.id);
                            let _ = self.ws.close(None).await;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Returns false when the connection should end
    async fn handle_message(&mut self, text: String) -> bool {
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Exit) => {
                tracing::info!("Exit requested by subscriber {}", self.id);
                self.cancel.cancel();
                false
            }
            Ok(ClientMessage::Unhandled) | Err(_) => {
                tracing::debug!("Echoing unhandled message from {}", self.id);
                self.ws.send(Message::Text(text)).await.is_ok()
            }
        }
    }

    fn detach(&self) {
        if self.slot.detach(&self.id) {
            tracing::debug!("Subscriber {} detached", self.id);
        }
    }
}
