//! The single live subscriber
//!
//! A connection attaches by handing over the sending half of its outbound
//! queue. Sends to a detached slot are a typed no-op; a failed send detaches
//! the slot so later pushes are skipped until a new connection attaches.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{RelayError, Result};

/// Attachment state of the push channel
#[derive(Debug, Default)]
pub enum Subscriber {
    #[default]
    Detached,
    Attached {
        id: String,
        tx: mpsc::UnboundedSender<String>,
    },
}

/// Outcome of a send attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Nobody attached; nothing was sent
    Detached,
}

/// Shared holder for the current subscriber
#[derive(Debug, Default)]
pub struct SubscriberSlot {
    inner: Mutex<Subscriber>,
}

impl SubscriberSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new subscriber, replacing any previous one.
    ///
    /// Dropping the previous sender closes that connection's queue.
    pub fn attach(&self, id: impl Into<String>, tx: mpsc::UnboundedSender<String>) {
        *self.inner.lock() = Subscriber::Attached { id: id.into(), tx };
    }

    /// Detach, but only if `id` is still the attached subscriber
    pub fn detach(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        match &*inner {
            Subscriber::Attached { id: current, .. } if current == id => {
                *inner = Subscriber::Detached;
                true
            }
            _ => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(*self.inner.lock(), Subscriber::Attached { .. })
    }

    /// Queue one text frame for the subscriber.
    ///
    /// Never logs, so it is safe to call from the log mirror.
    pub fn send(&self, text: String) -> Result<Delivery> {
        let (id, tx) = match &*self.inner.lock() {
            Subscriber::Detached => return Ok(Delivery::Detached),
            Subscriber::Attached { id, tx } => (id.clone(), tx.clone()),
        };

        match tx.send(text) {
            Ok(()) => Ok(Delivery::Sent),
            Err(_) => {
                self.detach(&id);
                Err(RelayError::TransportFailure {
                    message: format!("subscriber {} is gone", id),
                })
            }
        }
    }
}
