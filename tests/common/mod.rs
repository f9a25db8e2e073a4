//! Common test utilities and fixtures for tf2-roster-relay integration tests
//!
//! This module provides:
//! - `ScriptedGateway`, an in-memory RCON stand-in with editable replies
//! - console line builders in the game's exact output format
//! - helpers for draining and decoding push channel frames

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use tf2_roster_relay::{CommandGateway, RelayError, Result, SubscriberSlot};

/// Gateway that answers from a table and records every command
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, command: &str, text: impl Into<String>) {
        self.replies.lock().insert(command.to_string(), text.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CommandGateway for ScriptedGateway {
    async fn execute(&self, command: &str) -> Result<String> {
        self.calls.lock().push(command.to_string());
        self.replies
            .lock()
            .get(command)
            .cloned()
            .ok_or_else(|| RelayError::RconError {
                message: format!("Unknown command \"{}\"", command),
            })
    }
}

/// One `status` player row for account id `account`
pub fn status_line(user_id: u32, name: &str, account: u64) -> String {
    format!(
        "#    {:>3} \"{}\"    [U:1:{}]    01:02   40    0 active",
        user_id, name, account
    )
}

/// A full `status` reply with a header and the given rows
pub fn status_reply(rows: &[String]) -> String {
    let mut text = String::from(
        "hostname: Valve Matchmaking Server (Virginia)\n\
         map     : cp_process_final at: 0 x, 0 y, 0 z\n\
         # userid name                uniqueid            connected ping loss state\n",
    );
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    text
}

/// A `tf_lobby_debug` reply; `members` are (account, gc team, slot type)
pub fn lobby_reply(members: &[(u64, &str, &str)]) -> String {
    let mut text = format!(
        "CTFLobbyShared: ID:0000001  {} member(s), 0 pending\n",
        members.len()
    );
    for (i, (account, team, kind)) in members.iter().enumerate() {
        text.push_str(&format!(
            "  Member[{}] [U:1:{}]  team = {}  type = {}\n",
            i, account, team, kind
        ));
    }
    text
}

/// SteamID64 for a SteamID3 account number
pub fn steam64(account: u64) -> u64 {
    76_561_197_960_265_728 + account
}

/// Slot with an attached in-memory subscriber
pub fn attached_slot() -> (Arc<SubscriberSlot>, mpsc::UnboundedReceiver<String>) {
    let slot = Arc::new(SubscriberSlot::new());
    let (tx, rx) = mpsc::unbounded_channel();
    slot.attach("sub_test", tx);
    (slot, rx)
}

/// Decode every queued frame
pub fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut frames = Vec::new();
    while let Ok(text) = rx.try_recv() {
        frames.push(serde_json::from_str(&text).expect("frame is JSON"));
    }
    frames
}

/// Only the frames of one envelope type
pub fn of_type<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
    frames.iter().filter(|f| f["type"] == kind).collect()
}
