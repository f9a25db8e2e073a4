//! Thread-safe match state shared by the engine and the periodic tasks
//!
//! The engine task is the only writer of status and lobby data, but the
//! publisher, sweeper, scheduler and connection handshake all run as separate
//! tokio tasks. Every roster and lobby access therefore goes through a
//! `parking_lot` lock, held only for the duration of the in-memory operation.
//!
//! Lock order is lobby before roster wherever both are taken.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::model::{
    LobbyDebugEvent, PlayerRecord, SessionIdentity, StatusEvent, SteamId,
};
use crate::roster::lobby::{LobbyEnricher, LobbyIngest};
use crate::roster::RosterStore;

/// Roster, lobby snapshot and change tracking for one session
#[derive(Debug)]
pub struct MatchState {
    roster: RwLock<RosterStore>,
    lobby: RwLock<LobbyEnricher>,
    /// Set by every roster mutation, cleared by the publisher
    dirty: AtomicBool,
    /// When the last status line was applied
    last_status_update: Mutex<Option<Instant>>,
}

impl MatchState {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            roster: RwLock::new(RosterStore::new(identity)),
            lobby: RwLock::new(LobbyEnricher::new()),
            dirty: AtomicBool::new(false),
            last_status_update: Mutex::new(None),
        }
    }

    /// Apply a status line and return the merged record
    pub fn apply_status(&self, event: &StatusEvent, now: DateTime<Utc>) -> PlayerRecord {
        let lobby = self.lobby.read();
        let record = self.roster.write().apply_status(event, &lobby, now).clone();
        drop(lobby);

        *self.last_status_update.lock() = Some(Instant::now());
        self.mark_dirty();
        record
    }

    /// Replace the lobby snapshot and re-enrich the current roster
    pub fn ingest_lobby(&self, event: &LobbyDebugEvent) -> LobbyIngest {
        let mut lobby = self.lobby.write();
        let outcome = lobby.ingest(event);
        if let LobbyIngest::Replaced(_) = outcome {
            let changed = self.roster.write().enrich_all(&lobby);
            if changed > 0 {
                self.mark_dirty();
            }
        }
        outcome
    }

    /// Evict records outside the staleness window
    pub fn evict_stale(&self, now: DateTime<Utc>, window: Duration) -> Vec<SteamId> {
        let evicted = self.roster.write().evict_stale(now, window);
        if !evicted.is_empty() {
            self.mark_dirty();
        }
        evicted
    }

    pub fn resolve(&self, name: &str) -> SteamId {
        self.roster.read().resolve(name)
    }

    pub fn snapshot(&self) -> Vec<PlayerRecord> {
        self.roster.read().snapshot()
    }

    pub fn player_count(&self) -> usize {
        self.roster.read().len()
    }

    pub fn identity(&self) -> SessionIdentity {
        self.roster.read().identity().clone()
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clear the dirty flag, returning whether it was set
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    /// Time since the last applied status line, `None` if there was none
    pub fn since_last_status_update(&self) -> Option<Duration> {
        self.last_status_update.lock().map(|at| at.elapsed())
    }
}
