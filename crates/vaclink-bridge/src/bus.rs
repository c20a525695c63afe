//! Change-notification hub.
//!
//! Built on [`tokio::sync::broadcast`] so any number of observers can attach
//! without one slow subscriber blocking the read loop or the others.

use tokio::sync::broadcast;
use tracing::warn;
use vaclink_types::{BridgeEvent, BridgeEventKind};

/// Buffered events per subscriber before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 256;

/// Shared notification hub. Clone it cheaply – all clones feed the same
/// underlying channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    /// Create a hub with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Stamp `kind` with an id and timestamp and fan it out.
    ///
    /// Returns the number of subscribers that received the event. Zero
    /// subscribers is a normal condition, not an error.
    pub fn publish(&self, kind: BridgeEventKind) -> usize {
        self.sender.send(BridgeEvent::now(kind)).unwrap_or(0)
    }

    /// Attach an observer. Dropping the returned [`Subscription`]
    /// unsubscribes it.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An observer's handle onto the hub.
pub struct Subscription {
    receiver: broadcast::Receiver<BridgeEvent>,
}

impl Subscription {
    /// Wait for the next event.
    ///
    /// A subscriber that falls behind skips the dropped events with a
    /// warning rather than erroring out; observers re-read the store anyway,
    /// so a missed notification only delays a refresh. Returns `None` once
    /// the bus has shut down.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
