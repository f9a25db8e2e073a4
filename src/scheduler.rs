//! Status and lobby refresh triggers
//!
//! # Reactive
//!
//! A refresh signal from the console (`Lobby updated`, a player connecting)
//! requests `tf_lobby_debug` and `status` straight away.
//!
//! # Proactive
//!
//! Every interval the scheduler checks how long ago a status line was last
//! applied. At or past the interval it requests both commands; otherwise it
//! only logs.
//!
//! Requests are fire-and-forget: each one runs on its own task and the reply
//! is fed back into the engine queue like any other input, so a slow or lost
//! reply never delays the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::EngineInput;
use crate::model::RefreshReason;
use crate::rcon::CommandGateway;
use crate::state::MatchState;

/// Commands the scheduler issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCommand {
    Status,
    LobbyDebug,
}

impl RefreshCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::LobbyDebug => "tf_lobby_debug",
        }
    }
}

/// Lobby first, so the snapshot is in place when the status lines land
const REFRESH_SEQUENCE: [RefreshCommand; 2] = [RefreshCommand::LobbyDebug, RefreshCommand::Status];

/// Decision taken by one proactive tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Refresh,
    /// A status line was applied this long ago; nothing to do
    Skip(Duration),
}

/// Reactive and periodic roster refreshes
#[derive(Clone)]
pub struct RefreshScheduler {
    gateway: Arc<dyn CommandGateway>,
    inputs: mpsc::Sender<EngineInput>,
    state: Arc<MatchState>,
    interval: Duration,
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("interval", &self.interval)
            .finish()
    }
}

impl RefreshScheduler {
    pub fn new(
        gateway: Arc<dyn CommandGateway>,
        inputs: mpsc::Sender<EngineInput>,
        state: Arc<MatchState>,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            inputs,
            state,
            interval,
        }
    }

    /// React to a roster-changing console line
    pub fn trigger(&self, reason: RefreshReason) {
        tracing::info!("Refreshing roster after {:?}", reason);
        self.spawn_refresh();
    }

    /// Decide whether the periodic refresh is due
    pub fn decide(&self) -> TickDecision {
        match self.state.since_last_status_update() {
            Some(elapsed) if elapsed < self.interval => TickDecision::Skip(elapsed),
            _ => TickDecision::Refresh,
        }
    }

    /// One proactive tick
    pub fn tick(&self) -> TickDecision {
        let decision = self.decide();
        match decision {
            TickDecision::Refresh => {
                tracing::info!(
                    "Executing status + tf_lobby_debug after scheduled {}s",
                    self.interval.as_secs()
                );
                self.spawn_refresh();
            }
            TickDecision::Skip(elapsed) => {
                tracing::debug!(
                    "No refresh necessary, last status update {}s ago",
                    elapsed.as_secs()
                );
            }
        }
        decision
    }

    fn spawn_refresh(&self) {
        let gateway = Arc::clone(&self.gateway);
        let inputs = self.inputs.clone();

        tokio::spawn(async move {
            for command in REFRESH_SEQUENCE {
                match gateway.execute(command.as_str()).await {
                    Ok(text) => {
                        let input = EngineInput::CommandOutput { command, text };
                        if inputs.send(input).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Command '{}' failed: {}", command.as_str(), e);
                    }
                }
            }
        });
    }

    /// Tick every interval until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup is not doubled
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Refresh scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }
}
