//! Latest `tf_lobby_debug` snapshot
//!
//! The snapshot is replaced wholesale on every listing and never merged
//! field-by-field. The roster pulls tags from it when applying status lines.

use std::collections::HashMap;

use crate::model::{LobbyDebugEvent, PlayerTags, SteamId};

/// Result of ingesting one lobby-debug response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyIngest {
    /// Snapshot replaced; carries the new member count
    Replaced(usize),
    /// Lobby listing unavailable; lookups disabled until the next snapshot
    Unavailable,
}

/// Holder of the most recent lobby snapshot
#[derive(Debug, Default)]
pub struct LobbyEnricher {
    snapshot: Option<HashMap<SteamId, PlayerTags>>,
    available: bool,
}

impl LobbyEnricher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot, or suspend lookups on the unavailable sentinel.
    ///
    /// The sentinel keeps the previous snapshot around; it is only hidden.
    pub fn ingest(&mut self, event: &LobbyDebugEvent) -> LobbyIngest {
        match event {
            LobbyDebugEvent::Snapshot(members) => {
                let snapshot: HashMap<SteamId, PlayerTags> = members
                    .iter()
                    .map(|member| (member.steam_id, member.tags.clone()))
                    .collect();
                let count = snapshot.len();
                self.snapshot = Some(snapshot);
                self.available = true;
                LobbyIngest::Replaced(count)
            }
            LobbyDebugEvent::Unavailable => {
                self.available = false;
                LobbyIngest::Unavailable
            }
        }
    }

    /// Tags recorded for `id` in the current snapshot, if lookups are enabled
    pub fn lookup(&self, id: SteamId) -> Option<&PlayerTags> {
        if !self.available {
            return None;
        }
        self.snapshot.as_ref()?.get(&id)
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}
