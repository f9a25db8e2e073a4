//! The WebSocket push channel against the running core

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use tf2_roster_relay::config::{PushConfig, TimingConfig};
use tf2_roster_relay::relay::{spawn_core, Core};
use tf2_roster_relay::{EngineInput, NullSink, PushServer, SessionIdentity, SubscriberSlot};

use crate::common::*;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (SocketAddr, Core, CancellationToken) {
    let config = PushConfig {
        host: "127.0.0.1".into(),
        port: 0,
        path: "/websocket".into(),
    };
    let server = PushServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();

    let timing = TimingConfig {
        publish_interval_ms: 100,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let core = spawn_core(
        &timing,
        SessionIdentity::new("Me"),
        ScriptedGateway::new(),
        Arc::new(NullSink),
        Arc::new(SubscriberSlot::new()),
        &cancel,
    );
    tokio::spawn(server.run(core.publisher.clone(), cancel.clone()));
    (addr, core, cancel)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/websocket", addr))
        .await
        .unwrap();
    ws
}

/// Next JSON frame of the given type, skipping anything else
async fn next_of_type(ws: &mut Client, kind: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .unwrap();
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["type"] == kind {
                return value;
            }
        }
    }
}

#[tokio::test]
async fn subscriber_gets_handshake_then_updates() {
    let (addr, core, cancel) = start().await;
    let mut ws = connect(addr).await;

    let handshake = next_of_type(&mut ws, "player-update").await;
    assert_eq!(handshake["currentPlayers"], serde_json::json!([]));

    core.inputs
        .send(EngineInput::Line(status_line(3, "Carl", 5)))
        .await
        .unwrap();

    let update = next_of_type(&mut ws, "player-update").await;
    assert_eq!(update["currentPlayers"][0]["name"], "Carl");
    assert_eq!(update["currentPlayers"][0]["steamId"], steam64(5));

    cancel.cancel();
}

#[tokio::test]
async fn new_connection_replaces_old_subscriber() {
    let (addr, core, cancel) = start().await;

    let mut first = connect(addr).await;
    next_of_type(&mut first, "player-update").await;

    let mut second = connect(addr).await;
    next_of_type(&mut second, "player-update").await;

    // The superseded connection is closed by the server
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    core.inputs
        .send(EngineInput::Line("Carl killed Dana with knife.".to_string()))
        .await
        .unwrap();
    let frag = next_of_type(&mut second, "frag").await;
    assert_eq!(frag["frag"]["weapon"], "knife");

    cancel.cancel();
}

#[tokio::test]
async fn exit_message_cancels_everything() {
    let (addr, _core, cancel) = start().await;
    let mut ws = connect(addr).await;
    next_of_type(&mut ws, "player-update").await;

    ws.send(Message::Text(r#"{"type":"exit"}"#.to_string()))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
        .await
        .expect("exit cancels the relay");
}
