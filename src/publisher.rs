//! Rate-limited roster delivery and immediate kill feed forwarding
//!
//! Roster mutations only set a dirty flag. Once per tick the publisher checks
//! the flag and, with a subscriber attached, pushes the full roster and clears
//! it. A burst of N mutations inside one tick therefore yields one push, and
//! every mutation is delivered within one tick. Frags skip the flag entirely.
//!
//! There is no acknowledgment or retry: a failed send detaches the subscriber.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;
use crate::model::FragRecord;
use crate::push::protocol::ServerMessage;
use crate::push::subscriber::{Delivery, SubscriberSlot};
use crate::state::MatchState;

/// What a single publish attempt did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Roster pushed with this many players
    Pushed(usize),
    /// Nothing changed since the last push
    Clean,
    /// Changes pending but nobody is listening; the flag stays set
    NoSubscriber,
    /// Send or encoding failed
    Failed,
}

/// Coalescing publisher for roster updates
#[derive(Debug, Clone)]
pub struct UpdatePublisher {
    state: Arc<MatchState>,
    subscriber: Arc<SubscriberSlot>,
    interval: Duration,
}

impl UpdatePublisher {
    pub fn new(state: Arc<MatchState>, subscriber: Arc<SubscriberSlot>, interval: Duration) -> Self {
        Self {
            state,
            subscriber,
            interval,
        }
    }

    pub fn subscriber(&self) -> &Arc<SubscriberSlot> {
        &self.subscriber
    }

    /// One coalescing check
    pub fn tick(&self) -> PushOutcome {
        if !self.state.is_dirty() {
            return PushOutcome::Clean;
        }
        if !self.subscriber.is_attached() {
            return PushOutcome::NoSubscriber;
        }

        // Clear before snapshotting so a mutation racing the push re-arms the flag
        self.state.take_dirty();
        self.push_roster()
    }

    /// Push the full roster immediately, regardless of the dirty flag.
    ///
    /// Used for the handshake when a subscriber attaches.
    pub fn push_roster(&self) -> PushOutcome {
        let players = self.state.snapshot();
        let message = ServerMessage::PlayerUpdate {
            current_players: &players,
        };
        match self.deliver(&message) {
            Some(Delivery::Sent) => {
                tracing::debug!("Pushed roster with {} player(s)", players.len());
                PushOutcome::Pushed(players.len())
            }
            Some(Delivery::Detached) => PushOutcome::NoSubscriber,
            None => PushOutcome::Failed,
        }
    }

    /// Forward one kill feed entry right away
    pub fn push_frag(&self, frag: &FragRecord) -> bool {
        matches!(
            self.deliver(&ServerMessage::Frag { frag }),
            Some(Delivery::Sent)
        )
    }

    fn deliver(&self, message: &ServerMessage<'_>) -> Option<Delivery> {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Dropping {}: {}", message.kind(), e);
                return None;
            }
        };

        match self.subscriber.send(json) {
            Ok(delivery) => Some(delivery),
            Err(RelayError::TransportFailure { message: reason }) => {
                tracing::warn!(
                    "Failed to send {} to subscriber, detaching: {}",
                    message.kind(),
                    reason
                );
                None
            }
            Err(e) => {
                tracing::warn!("Failed to send {}: {}", message.kind(), e);
                None
            }
        }
    }

    /// Check the dirty flag every interval until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Update publisher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlayerTags, SessionIdentity, StatusEvent, SteamId};
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn status(id: u64, name: &str) -> StatusEvent {
        StatusEvent {
            user_id: 1,
            name: name.into(),
            steam_id: SteamId(id),
            connected: "00:01".into(),
            ping: 20,
            loss: 0,
            state: "active".into(),
            tags: PlayerTags::default(),
        }
    }

    fn setup() -> (Arc<MatchState>, UpdatePublisher, mpsc::UnboundedReceiver<String>) {
        let state = Arc::new(MatchState::new(SessionIdentity::new("Me")));
        let slot = Arc::new(SubscriberSlot::new());
        let (tx, rx) = mpsc::unbounded_channel();
        slot.attach("sub_test", tx);
        let publisher = UpdatePublisher::new(Arc::clone(&state), slot, Duration::from_secs(1));
        (state, publisher, rx)
    }

    #[test]
    fn test_burst_coalesces_into_one_push() {
        let (state, publisher, mut rx) = setup();

        for i in 0..25 {
            state.apply_status(&status(i % 5, &format!("p{}", i % 5)), Utc::now());
        }

        assert_eq!(publisher.tick(), PushOutcome::Pushed(5));
        assert_eq!(publisher.tick(), PushOutcome::Clean);

        let first = rx.try_recv().unwrap();
        assert!(first.starts_with(r#"{"type":"player-update""#));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_flag_survives_until_subscriber_attaches() {
        let state = Arc::new(MatchState::new(SessionIdentity::new("Me")));
        let slot = Arc::new(SubscriberSlot::new());
        let publisher =
            UpdatePublisher::new(Arc::clone(&state), Arc::clone(&slot), Duration::from_secs(1));

        state.apply_status(&status(1, "Alice"), Utc::now());
        assert_eq!(publisher.tick(), PushOutcome::NoSubscriber);
        assert!(state.is_dirty());

        let (tx, mut rx) = mpsc::unbounded_channel();
        slot.attach("late", tx);
        assert_eq!(publisher.tick(), PushOutcome::Pushed(1));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_failed_send_detaches() {
        let (state, publisher, rx) = setup();
        drop(rx);

        state.mark_dirty();
        assert_eq!(publisher.tick(), PushOutcome::Failed);
        assert!(!publisher.subscriber().is_attached());

        state.mark_dirty();
        assert_eq!(publisher.tick(), PushOutcome::NoSubscriber);
    }

    #[test]
    fn test_frag_bypasses_coalescing() {
        let (state, publisher, mut rx) = setup();
        let frag = FragRecord {
            killer: "Alice".into(),
            killer_steam_id: SteamId(1),
            victim: "Bob".into(),
            victim_steam_id: SteamId::UNRESOLVED,
            weapon: "scattergun".into(),
            crit: false,
            timestamp: Utc::now(),
        };

        assert!(publisher.push_frag(&frag));
        assert!(publisher.push_frag(&frag));
        assert!(!state.is_dirty());

        assert!(rx.try_recv().unwrap().contains(r#""type":"frag""#));
        assert!(rx.try_recv().unwrap().contains(r#""victimSteamId":0"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_pushes_within_one_tick() {
        let (state, publisher, mut rx) = setup();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        // Let the immediate first tick pass with nothing to send
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());

        state.apply_status(&status(1, "Alice"), Utc::now());
        state.apply_status(&status(2, "Bob"), Utc::now());
        tokio::time::sleep(Duration::from_millis(1000)).await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }
}
