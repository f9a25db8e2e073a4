//! Console line classification
//!
//! Turns one raw console line into at most one [`GameEvent`]. Lines that match
//! nothing are simply ignored; a miss is never an error.
//!
//! Multi-line command responses (`name`, `tf_lobby_debug`) are parsed as a
//! whole by [`parse_player_name`] and [`parse_lobby_debug`], since a lobby
//! listing only means something as a complete snapshot.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{
    ChatEvent, FragEvent, GameEvent, LobbyDebugEvent, LobbyMember, PlayerTags, RefreshReason,
    StatusEvent, SteamId,
};

/// Reply to `tf_lobby_debug` when the client is not in a matchmade lobby
pub const LOBBY_UNAVAILABLE: &str = "Failed to find lobby shared object";

// #    284 "Some Name"   [U:1:123456789]  23:45   67    0 active
static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^#\s+(\d+)\s+"(.*)"\s+(\[U:\d:\d+\])\s+(\d+(?::\d+){1,2})\s+(\d+)\s+(\d+)\s+(\w+)"#,
    )
    .expect("status pattern compiles")
});

// *DEAD*(TEAM) Some Name :  hello
static CHAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*DEAD\*|\*SPEC\*)?(\(TEAM\))?\s*(.+?) :  (.*)$").expect("chat pattern compiles")
});

/// Separator between speaker and message in a chat line
const CHAT_SEPARATOR: &str = " :  ";

// Killer killed Victim with scattergun. (crit)
static FRAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?) killed (.+) with (\S+)\.(\s+\(crit\))?$").expect("frag pattern compiles")
});

//   Member[0] [U:1:123]  team = TF_GC_TEAM_INVADERS  type = MATCH_PLAYER
static LOBBY_MEMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(Member|Pending)\[\d+\]\s+(\[U:\d:\d+\])\s+team\s*=\s*(\w+)\s+type\s*=\s*(\w+)")
        .expect("lobby pattern compiles")
});

// "name" = "Some Name" ( def. "unnamed" )
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^"name" = "(.*?)"(?:\s*\(\s*def\..*\))?\s*$"#).expect("name pattern compiles")
});

/// Classify one console line.
///
/// Structured patterns win over refresh markers, so a chat message that
/// happens to contain "connected" is still chat.
pub fn classify(line: &str) -> Option<GameEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    if let Some(status) = parse_status(line) {
        return Some(GameEvent::Status(status));
    }
    if let Some(frag) = parse_frag(line) {
        return Some(GameEvent::Frag(frag));
    }
    if let Some(chat) = parse_chat(line) {
        return Some(GameEvent::Chat(chat));
    }
    refresh_reason(line).map(GameEvent::RefreshSignal)
}

fn parse_status(line: &str) -> Option<StatusEvent> {
    let caps = STATUS_RE.captures(line)?;
    Some(StatusEvent {
        user_id: caps[1].parse().ok()?,
        name: caps[2].to_string(),
        steam_id: SteamId::from_steam3(&caps[3])?,
        connected: caps[4].to_string(),
        ping: caps[5].parse().ok()?,
        loss: caps[6].parse().ok()?,
        state: caps[7].to_string(),
        tags: PlayerTags::default(),
    })
}

fn parse_frag(line: &str) -> Option<FragEvent> {
    let caps = FRAG_RE.captures(line)?;
    // "Bob :  I killed him with fire." is chat, not a kill
    if caps[1].contains(CHAT_SEPARATOR) {
        return None;
    }
    Some(FragEvent {
        killer: caps[1].to_string(),
        victim: caps[2].to_string(),
        weapon: caps[3].to_string(),
        crit: caps.get(4).is_some(),
    })
}

fn parse_chat(line: &str) -> Option<ChatEvent> {
    let caps = CHAT_RE.captures(line)?;
    Some(ChatEvent {
        name: caps[3].to_string(),
        message: caps[4].to_string(),
        dead: caps.get(1).is_some_and(|m| m.as_str() == "*DEAD*"),
        team_only: caps.get(2).is_some(),
    })
}

/// Lines that mean the roster probably changed. The `status` header also
/// contains "connected", so anything mentioning `uniqueid` is an echo.
fn refresh_reason(line: &str) -> Option<RefreshReason> {
    if line.contains("Lobby updated") {
        Some(RefreshReason::LobbyUpdated)
    } else if line.contains("connected") && !line.contains("uniqueid") {
        Some(RefreshReason::PlayerConnected)
    } else {
        None
    }
}

/// Parse a complete `tf_lobby_debug` response.
pub fn parse_lobby_debug(text: &str) -> LobbyDebugEvent {
    if text.contains(LOBBY_UNAVAILABLE) {
        return LobbyDebugEvent::Unavailable;
    }

    let members = text
        .lines()
        .filter_map(|line| {
            let caps = LOBBY_MEMBER_RE.captures(line)?;
            Some(LobbyMember {
                steam_id: SteamId::from_steam3(&caps[2])?,
                tags: PlayerTags {
                    team: team_label(&caps[3]).to_string(),
                    kind: caps[4].to_string(),
                    member_type: caps[1].to_string(),
                },
            })
        })
        .collect();

    LobbyDebugEvent::Snapshot(members)
}

/// Map game-coordinator team names to the in-game labels.
fn team_label(raw: &str) -> &str {
    match raw {
        "TF_GC_TEAM_DEFENDERS" => "RED",
        "TF_GC_TEAM_INVADERS" => "BLU",
        other => other,
    }
}

/// Extract the local player's name from the response to the `name` command.
pub fn parse_player_name(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| NAME_RE.captures(line.trim()))
        .map(|caps| caps[1].to_string())
        .find(|name| !name.is_empty())
}
