//! Push channel
//!
//! A local WebSocket endpoint the UI connects to. All messages are JSON text
//! frames:
//!
//! ```json
//! // Server -> Client
//! {"type": "player-update", "currentPlayers": [{...}, ...]}
//! {"type": "frag", "frag": {"killer": "...", "killerSteamId": 7656..., ...}}
//! {"type": "application-log", "message": "..."}
//!
//! // Client -> Server
//! {"type": "exit"}
//! ```
//!
//! Only one subscriber is live at a time; a new connection replaces the old
//! one.

pub mod connection;
pub mod protocol;
pub mod subscriber;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::PushConfig;
use crate::error::{RelayError, Result};
use crate::publisher::UpdatePublisher;

pub use connection::handle_connection;
pub use protocol::{ClientMessage, ServerMessage};
pub use subscriber::{Delivery, SubscriberSlot};

/// Bound WebSocket listener
#[derive(Debug)]
pub struct PushServer {
    listener: TcpListener,
    path: Arc<str>,
}

impl PushServer {
    /// Bind the configured address. Failure to bind is fatal at startup.
    pub async fn bind(config: &PushConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::startup(format!("Unable to listen on {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            path: Arc::from(config.path.as_str()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until cancelled
    pub async fn run(self, publisher: UpdatePublisher, cancel: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("Push channel listening on ws://{}{}", addr, self.path);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Push server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            tokio::spawn(handle_connection(
                                stream,
                                Arc::clone(&self.path),
                                publisher.clone(),
                                cancel.clone(),
                            ));
                        }
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    }
}
