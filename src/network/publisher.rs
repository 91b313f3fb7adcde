//! Event Publisher
//!
//! Fan-out of committed tournament transitions to every connection task.
//! Each transition gets one revision number; all messages it produces
//! carry that revision so subscribers can collapse them.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::network::protocol::{Topic, TournamentEvent};

/// Default broadcast buffer per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// One published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Topic.
    pub topic: Topic,
    /// Transition revision.
    pub revision: u64,
    /// JSON-encoded event body.
    pub body: String,
}

/// Broadcasts events to connected subscribers.
#[derive(Debug)]
pub struct EventPublisher {
    tx: broadcast::Sender<Published>,
    revision: AtomicU64,
}

impl EventPublisher {
    /// Create a publisher with the given per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            revision: AtomicU64::new(0),
        }
    }

    /// Subscribe to every future message.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.tx.subscribe()
    }

    /// Last revision handed out.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Publish the events of one committed transition.
    ///
    /// Delivery is at-most-once: a transition with no listeners is
    /// dropped, and lagging receivers lose the oldest messages.
    /// Returns the revision assigned to the transition.
    pub fn publish(&self, events: &[TournamentEvent]) -> u64 {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;

        for event in events {
            let body = match serde_json::to_string(event) {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "Failed to encode event body");
                    continue;
                }
            };

            let message = Published {
                topic: event.topic(),
                revision,
                body,
            };

            match self.tx.send(message) {
                Ok(receivers) => debug!(topic = %event.topic(), revision, receivers, "Published event"),
                Err(_) => debug!(topic = %event.topic(), revision, "No subscribers for event"),
            }
        }

        revision
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
