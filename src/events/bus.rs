//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from multiple sources (lifecycle, watchers,
//! periodic tasks, async callbacks, the signal listener).
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Subscriber (one):
//!   Lifecycle ──┐
//!   Watcher   ──┼──────► Bus ───────► subscriber_listener ────► SubscriberSet
//!   Periodic  ──┤  (broadcast chan)     (in Lifecycle::run)
//!   Signals   ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active subscribers at send time.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Multiple publishers can publish concurrently; subscribers receive clones of each event.
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_existing_receivers_in_order() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();

        bus.publish(Event::new(EventKind::ShuttingDown));
        bus.publish(Event::new(EventKind::StoppingWatchers));

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ShuttingDown);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::StoppingWatchers);
    }

    #[test]
    fn test_publish_without_receivers_is_a_noop() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::KeeperStarted));
    }
}
