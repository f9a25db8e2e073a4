//! Event dispatch
//!
//! The engine owns the single input queue. Console lines and command replies
//! both arrive here, are classified, and are applied to the shared match
//! state in arrival order. Nothing in this module blocks on the network:
//! refreshes are handed to the scheduler, roster pushes are left to the
//! publisher's tick, and only frags are forwarded inline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classifier::{classify, parse_lobby_debug};
use crate::model::{
    ChatEvent, ChatRecord, FragEvent, FragRecord, GameEvent, LobbyDebugEvent, StatusEvent,
};
use crate::publisher::UpdatePublisher;
use crate::roster::LobbyIngest;
use crate::scheduler::{RefreshCommand, RefreshScheduler};
use crate::state::MatchState;
use crate::store::PersistenceSink;

/// Anything the engine consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    /// One line appended to the console log
    Line(String),
    /// Full reply to a command the scheduler issued
    CommandOutput { command: RefreshCommand, text: String },
}

/// Applies classified events to the match state
#[derive(Clone)]
pub struct Engine {
    state: Arc<MatchState>,
    publisher: UpdatePublisher,
    sink: Arc<dyn PersistenceSink>,
    scheduler: RefreshScheduler,
}

impl Engine {
    pub fn new(
        state: Arc<MatchState>,
        publisher: UpdatePublisher,
        sink: Arc<dyn PersistenceSink>,
        scheduler: RefreshScheduler,
    ) -> Self {
        Self {
            state,
            publisher,
            sink,
            scheduler,
        }
    }

    pub fn state(&self) -> &Arc<MatchState> {
        &self.state
    }

    /// Handle one queued input
    pub fn handle_input(&self, input: EngineInput) {
        let now = Utc::now();
        match input {
            EngineInput::Line(line) => {
                if let Some(event) = classify(&line) {
                    self.handle_event(event, now);
                }
            }
            EngineInput::CommandOutput {
                command: RefreshCommand::Status,
                text,
            } => {
                // Same path as status lines echoed into the console log
                for event in text.lines().filter_map(classify) {
                    if let GameEvent::Status(status) = event {
                        self.on_status(&status, now);
                    }
                }
            }
            EngineInput::CommandOutput {
                command: RefreshCommand::LobbyDebug,
                text,
            } => {
                self.handle_event(GameEvent::LobbyDebug(parse_lobby_debug(&text)), now);
            }
        }
    }

    /// Apply one classified event
    pub fn handle_event(&self, event: GameEvent, now: DateTime<Utc>) {
        match event {
            GameEvent::Status(status) => self.on_status(&status, now),
            GameEvent::Chat(chat) => self.on_chat(chat, now),
            GameEvent::Frag(frag) => self.on_frag(frag, now),
            // Never produced by `classify`; built from a whole reply above
            GameEvent::LobbyDebug(lobby) => self.on_lobby(&lobby),
            GameEvent::RefreshSignal(reason) => self.scheduler.trigger(reason),
        }
    }

    fn on_status(&self, status: &StatusEvent, now: DateTime<Utc>) {
        let record = self.state.apply_status(status, now);
        tracing::trace!("Status for {} ({})", record.name, record.steam_id);

        if let Err(e) = self.sink.store_player(&record) {
            tracing::warn!("Failed to store player {}: {}", record.steam_id, e);
        }
    }

    fn on_chat(&self, chat: ChatEvent, now: DateTime<Utc>) {
        let steam_id = self.state.resolve(&chat.name);
        let record = ChatRecord {
            steam_id,
            name: chat.name,
            message: chat.message,
            dead: chat.dead,
            team_only: chat.team_only,
            timestamp: now,
        };

        tracing::info!(
            "{}{}{} ({}): {}",
            if record.dead { "*DEAD* " } else { "" },
            if record.team_only { "(TEAM) " } else { "" },
            record.name,
            record.steam_id,
            record.message
        );

        if let Err(e) = self.sink.store_chat(&record) {
            tracing::warn!("Failed to store chat from {}: {}", record.name, e);
        }
    }

    fn on_frag(&self, frag: FragEvent, now: DateTime<Utc>) {
        let record = FragRecord {
            killer_steam_id: self.state.resolve(&frag.killer),
            victim_steam_id: self.state.resolve(&frag.victim),
            killer: frag.killer,
            victim: frag.victim,
            weapon: frag.weapon,
            crit: frag.crit,
            timestamp: now,
        };
        self.publisher.push_frag(&record);
    }

    fn on_lobby(&self, lobby: &LobbyDebugEvent) {
        match self.state.ingest_lobby(lobby) {
            LobbyIngest::Replaced(count) => {
                tracing::debug!("Lobby snapshot replaced with {} member(s)", count);
            }
            LobbyIngest::Unavailable => {
                tracing::debug!("No lobby available, keeping previous enrichment");
            }
        }
    }

    /// Drain the input queue until cancelled or every sender is gone
    pub async fn run(self, mut inputs: mpsc::Receiver<EngineInput>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Engine shutting down");
                    break;
                }
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => {
                        tracing::debug!("Engine input closed");
                        break;
                    }
                },
            }
        }
    }
}
