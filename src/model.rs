//! Roster, chat and kill feed data model
//!
//! Identity is the SteamID64. Console output carries SteamID3 (`[U:1:N]`),
//! which is converted on the way in so every record is keyed the same way.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Offset between an individual account id and its SteamID64
const STEAM_ID64_BASE: u64 = 76_561_197_960_265_728;

/// Stable numeric player identity (SteamID64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(pub u64);

impl SteamId {
    /// Sentinel carried by chat and frag records whose name did not resolve
    pub const UNRESOLVED: SteamId = SteamId(0);

    /// Parse a SteamID3 such as `[U:1:22202]`
    pub fn from_steam3(text: &str) -> Option<Self> {
        let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
        let mut parts = inner.split(':');
        if parts.next()? != "U" {
            return None;
        }
        let _universe: u8 = parts.next()?.parse().ok()?;
        let account: u64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(SteamId(STEAM_ID64_BASE + account))
    }

    pub fn is_resolved(&self) -> bool {
        *self != Self::UNRESOLVED
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Team and lobby membership tags for one player
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTags {
    /// Team (`RED`, `BLU`, or the raw lobby value)
    pub team: String,
    /// Lobby slot type, e.g. `MATCH_PLAYER`
    #[serde(rename = "type")]
    pub kind: String,
    /// Lobby membership list the player appeared in (`Member` / `Pending`)
    pub member_type: String,
}

impl PlayerTags {
    /// Overwrite each field with `other`'s value only where that value is non-empty.
    pub fn merge_non_empty(&mut self, other: &PlayerTags) {
        if !other.team.is_empty() {
            self.team.clone_from(&other.team);
        }
        if !other.kind.is_empty() {
            self.kind.clone_from(&other.kind);
        }
        if !other.member_type.is_empty() {
            self.member_type.clone_from(&other.member_type);
        }
    }
}

/// Canonical record for a player believed to be in the match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub steam_id: SteamId,
    pub name: String,
    /// Server-side user id from `status`
    pub user_id: u32,
    /// Connection duration as printed by `status` (`12:34`)
    pub connected: String,
    pub ping: u32,
    pub loss: u32,
    pub state: String,
    #[serde(flatten)]
    pub tags: PlayerTags,
    pub is_me: bool,
    /// Last time a status line for this id was observed
    pub last_seen: DateTime<Utc>,
}

/// One player line from `status` output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub user_id: u32,
    pub name: String,
    pub steam_id: SteamId,
    pub connected: String,
    pub ping: u32,
    pub loss: u32,
    pub state: String,
    /// Usually empty; status output carries no team information
    pub tags: PlayerTags,
}

/// A chat line from the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub name: String,
    pub message: String,
    pub dead: bool,
    pub team_only: bool,
}

/// A kill feed line from the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragEvent {
    pub killer: String,
    pub victim: String,
    pub weapon: String,
    pub crit: bool,
}

/// One entry of a `tf_lobby_debug` listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyMember {
    pub steam_id: SteamId,
    pub tags: PlayerTags,
}

/// Parsed `tf_lobby_debug` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyDebugEvent {
    Snapshot(Vec<LobbyMember>),
    /// The client reported `Failed to find lobby shared object`
    Unavailable,
}

/// Why a roster refresh was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    LobbyUpdated,
    PlayerConnected,
}

/// Output of the line classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Status(StatusEvent),
    Chat(ChatEvent),
    Frag(FragEvent),
    LobbyDebug(LobbyDebugEvent),
    RefreshSignal(RefreshReason),
}

/// Chat line with the speaker resolved against the roster
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub steam_id: SteamId,
    pub name: String,
    pub message: String,
    pub dead: bool,
    pub team_only: bool,
    pub timestamp: DateTime<Utc>,
}

/// Kill feed entry with both parties resolved against the roster
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragRecord {
    pub killer: String,
    pub killer_steam_id: SteamId,
    pub victim: String,
    pub victim_steam_id: SteamId,
    pub weapon: String,
    pub crit: bool,
    pub timestamp: DateTime<Utc>,
}

/// Name of the local player, captured once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    name: String,
}

impl SessionIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exact name match; two players sharing our display name both match.
    pub fn is_me(&self, name: &str) -> bool {
        self.name == name
    }
}
