//! Administrative command gateway over Source RCON
//!
//! # Wire format
//!
//! Every packet is little-endian:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬────────────────┬────┐
//! │ size i32 │  id i32  │ type i32 │ body (ASCII) \0│ \0 │
//! └──────────┴──────────┴──────────┴────────────────┴────┘
//! ```
//!
//! `size` counts everything after itself. A command's reply may span several
//! packets, so every command is followed by an empty response-value packet;
//! the server mirrors it back once the real reply is complete.
//!
//! No timeout is imposed on a command as a whole; the configured I/O timeout
//! only bounds each individual socket operation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::RconConfig;
use crate::error::{RelayError, Result};

const SERVERDATA_AUTH: i32 = 3;
const SERVERDATA_AUTH_RESPONSE: i32 = 2;
const SERVERDATA_EXECCOMMAND: i32 = 2;
const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Smallest legal `size`: id + type + two terminators
const MIN_PACKET_SIZE: i32 = 10;
/// Servers split replies at 4096 bytes; anything far beyond that is garbage
const MAX_PACKET_SIZE: i32 = 4096 * 4;

/// Something that can run an administrative command and return its output
#[async_trait]
pub trait CommandGateway: Send + Sync {
    async fn execute(&self, command: &str) -> Result<String>;
}

/// One decoded RCON packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let size = self.body.len() as i32 + MIN_PACKET_SIZE;
        let mut buf = Vec::with_capacity(size as usize + 4);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf
    }
}

/// An authenticated RCON session over any byte stream
#[derive(Debug)]
pub struct RconConnection<S> {
    stream: S,
    next_id: i32,
    io_timeout: Duration,
}

impl<S> RconConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Authenticate over an already-open stream
    pub async fn authenticate(stream: S, password: &str, io_timeout: Duration) -> Result<Self> {
        let mut conn = Self {
            stream,
            next_id: 1,
            io_timeout,
        };

        let auth_id = conn.allocate_id();
        conn.write_packet(&Packet::new(auth_id, SERVERDATA_AUTH, password))
            .await?;

        // Servers send an empty response value before the auth response
        loop {
            let packet = conn.read_packet().await?;
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if packet.id == -1 {
                return Err(RelayError::RconAuthRejected);
            }
            if packet.id == auth_id {
                return Ok(conn);
            }
        }
    }

    /// Run one command and collect its complete reply
    pub async fn exec(&mut self, command: &str) -> Result<String> {
        let command_id = self.allocate_id();
        let sentinel_id = self.allocate_id();

        self.write_packet(&Packet::new(command_id, SERVERDATA_EXECCOMMAND, command))
            .await?;
        self.write_packet(&Packet::new(sentinel_id, SERVERDATA_RESPONSE_VALUE, ""))
            .await?;

        let mut reply = String::new();
        loop {
            let packet = self.read_packet().await?;
            if packet.id == sentinel_id {
                break;
            }
            // Leftovers from earlier sentinels carry stale ids and are skipped
            if packet.id == command_id && packet.kind == SERVERDATA_RESPONSE_VALUE {
                reply.push_str(&packet.body);
            }
        }
        Ok(reply)
    }

    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if self.next_id == i32::MAX { 1 } else { self.next_id + 1 };
        id
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        let bytes = packet.encode();
        tokio::time::timeout(self.io_timeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| RelayError::RconError {
                message: "write timed out".to_string(),
            })??;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Packet> {
        tokio::time::timeout(self.io_timeout, read_packet(&mut self.stream))
            .await
            .map_err(|_| RelayError::RconError {
                message: "read timed out".to_string(),
            })?
    }
}

/// Read and decode one packet
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet> {
    let size = reader.read_i32_le().await?;
    if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&size) {
        return Err(RelayError::RconError {
            message: format!("invalid packet size {}", size),
        });
    }

    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await?;

    let id = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let kind = i32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let body_bytes = &payload[8..payload.len() - 2];
    let body_end = body_bytes
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(body_bytes.len());

    Ok(Packet {
        id,
        kind,
        body: String::from_utf8_lossy(&body_bytes[..body_end]).into_owned(),
    })
}

/// Gateway to the game client's RCON listener.
///
/// Commands are serialized over one connection. The connection is opened on
/// first use and dropped after any transport error, so the next command
/// reconnects.
pub struct RconGateway {
    config: RconConfig,
    conn: Mutex<Option<RconConnection<TcpStream>>>,
}

impl RconGateway {
    pub fn new(config: RconConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Connect and authenticate eagerly; used at startup
    pub async fn connect(config: RconConfig) -> Result<Self> {
        let gateway = Self::new(config);
        let conn = gateway.open().await?;
        *gateway.conn.lock().await = Some(conn);
        Ok(gateway)
    }

    async fn open(&self) -> Result<RconConnection<TcpStream>> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let timeout = self.config.io_timeout();

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| RelayError::RconError {
                message: format!("connect to {} timed out", addr),
            })?
            .map_err(|e| RelayError::RconError {
                message: format!("connect to {} failed: {}", addr, e),
            })?;

        tracing::info!("Connected to RCON at {}", addr);
        RconConnection::authenticate(stream, &self.config.password, timeout).await
    }
}

impl std::fmt::Debug for RconGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconGateway")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish()
    }
}

#[async_trait]
impl CommandGateway for RconGateway {
    async fn execute(&self, command: &str) -> Result<String> {
        let mut guard = self.conn.lock().await;

        if guard.is_none() {
            *guard = Some(self.open().await?);
        }

        let result = match guard.as_mut() {
            Some(conn) => conn.exec(command).await,
            None => Err(RelayError::RconError {
                message: "not connected".to_string(),
            }),
        };

        if result.is_err() {
            // Force a reconnect on the next command
            *guard = None;
        }
        result
    }
}
