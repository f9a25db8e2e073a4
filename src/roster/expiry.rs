//! Staleness sweep
//!
//! Players who disconnect simply stop appearing in `status` output, so the
//! only way they leave the roster is by ageing out. Only status lines refresh
//! `last_seen`; chat and kill feed mentions never extend a record's life.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::state::MatchState;

/// Periodic eviction of stale roster records
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    state: Arc<MatchState>,
    window: Duration,
    interval: Duration,
}

impl ExpirySweeper {
    /// Create a sweeper. The interval is clamped to the window so a departed
    /// player disappears within one window of their last status line.
    pub fn new(state: Arc<MatchState>, window: Duration, interval: Duration) -> Self {
        Self {
            state,
            window,
            interval: interval.min(window).max(Duration::from_millis(100)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sweep at `now`, returning the number of evicted players
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let evicted = self.state.evict_stale(now, self.window);
        if !evicted.is_empty() {
            tracing::info!(
                "Evicted {} stale player(s): {:?}",
                evicted.len(),
                evicted.iter().map(|id| id.0).collect::<Vec<_>>()
            );
        }
        evicted.len()
    }

    /// Sweep on a fixed interval until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Expiry sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep(Utc::now());
                }
            }
        }
    }
}
