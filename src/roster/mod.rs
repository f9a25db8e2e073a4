//! Canonical match roster
//!
//! One [`PlayerRecord`] per SteamID64. Status lines upsert records, the lobby
//! snapshot enriches them, and the expiry sweep drops anything that has not
//! been seen in a status line for a full staleness window.
//!
//! # Merge rule
//!
//! Status fields (name, ping, loss, state, ...) always take the latest value.
//! Team/type/member tags are only ever overwritten by non-empty values, so a
//! status line without lobby data never blanks a team we already know.
//!
//! # Known limitations
//!
//! - Name lookups are an exact linear scan. With duplicate display names the
//!   record with the lowest id wins.
//! - The self flag compares display names, so a namesake is also flagged.

pub mod expiry;
pub mod lobby;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::model::{PlayerRecord, SessionIdentity, StatusEvent, SteamId};
use lobby::LobbyEnricher;

pub use expiry::ExpirySweeper;
pub use lobby::LobbyIngest;

/// Id-keyed set of players believed to be in the match
#[derive(Debug)]
pub struct RosterStore {
    identity: SessionIdentity,
    players: BTreeMap<SteamId, PlayerRecord>,
}

impl RosterStore {
    /// Create an empty roster for the given local player
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            players: BTreeMap::new(),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Upsert a record from a status line.
    ///
    /// Tags come from the event first, then the lobby snapshot, each applied
    /// only where non-empty. `last_seen` never moves backwards.
    pub fn apply_status(
        &mut self,
        event: &StatusEvent,
        lobby: &LobbyEnricher,
        now: DateTime<Utc>,
    ) -> &PlayerRecord {
        let is_me = self.identity.is_me(&event.name);

        let record = self
            .players
            .entry(event.steam_id)
            .and_modify(|existing| {
                existing.name.clone_from(&event.name);
                existing.user_id = event.user_id;
                existing.connected.clone_from(&event.connected);
                existing.ping = event.ping;
                existing.loss = event.loss;
                existing.state.clone_from(&event.state);
                existing.is_me = is_me;
                existing.last_seen = existing.last_seen.max(now);
            })
            .or_insert_with(|| PlayerRecord {
                steam_id: event.steam_id,
                name: event.name.clone(),
                user_id: event.user_id,
                connected: event.connected.clone(),
                ping: event.ping,
                loss: event.loss,
                state: event.state.clone(),
                tags: Default::default(),
                is_me,
                last_seen: now,
            });

        record.tags.merge_non_empty(&event.tags);
        if let Some(tags) = lobby.lookup(event.steam_id) {
            record.tags.merge_non_empty(tags);
        }

        record
    }

    /// Re-apply the lobby snapshot to every known record.
    ///
    /// Returns how many records changed.
    pub fn enrich_all(&mut self, lobby: &LobbyEnricher) -> usize {
        let mut changed = 0;
        for record in self.players.values_mut() {
            if let Some(tags) = lobby.lookup(record.steam_id) {
                let before = record.tags.clone();
                record.tags.merge_non_empty(tags);
                if record.tags != before {
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Exact-match name lookup
    pub fn lookup_by_name(&self, name: &str) -> Option<SteamId> {
        self.players
            .values()
            .find(|record| record.name == name)
            .map(|record| record.steam_id)
    }

    /// Name lookup that falls back to [`SteamId::UNRESOLVED`]
    pub fn resolve(&self, name: &str) -> SteamId {
        self.lookup_by_name(name).unwrap_or(SteamId::UNRESOLVED)
    }

    /// Drop every record last seen `window` or longer before `now`.
    ///
    /// Returns the evicted ids.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, window: Duration) -> Vec<SteamId> {
        let mut evicted = Vec::new();
        self.players.retain(|id, record| {
            // A last_seen in the future converts to Err and counts as fresh
            let stale = (now - record.last_seen)
                .to_std()
                .is_ok_and(|age| age >= window);
            if stale {
                evicted.push(*id);
            }
            !stale
        });
        evicted
    }

    pub fn get(&self, id: SteamId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    /// All current records, ordered by id
    pub fn snapshot(&self) -> Vec<PlayerRecord> {
        self.players.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
