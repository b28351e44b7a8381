//! # Fan-out of lifecycle events to the keeper's subscribers.
//!
//! The listener in [`Lifecycle::run`](crate::Lifecycle::run) hands every bus
//! event to [`SubscriberSet::emit`]. Each subscriber owns a bounded queue and a
//! worker, so a slow log sink never holds back block handling.
//!
//! ```text
//! listener ── emit(Event) ──► Arc<Event>
//!                               ├──► [queue: log]     ──► worker ──► on_event()
//!                               ├──► [queue: metrics] ──► worker ──► on_event()
//!                               └──► [queue: alerts]  ──► worker ──► on_event()
//!                                          │ full / closed
//!                                          ▼
//!                                  SubscriberOverflow (on the bus, never re-reported)
//! ```
//!
//! Each subscriber sees events in bus order. There is no ordering across
//! subscribers. A panic inside `on_event` is reported as `SubscriberPanicked`
//! and the worker keeps consuming.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Queue {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Per-subscriber queues plus their worker tasks.
pub struct SubscriberSet {
    queues: Vec<Queue>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Must run inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (queues, workers): (Vec<_>, Vec<_>) = subs
            .into_iter()
            .map(|sub| spawn_worker(sub, bus.clone()))
            .unzip();
        Self {
            queues,
            workers,
            bus,
        }
    }

    /// Queues `event` for every subscriber without waiting on any of them.
    ///
    /// A subscriber whose queue is full or whose worker is gone misses the
    /// event; that is reported once as `SubscriberOverflow`.
    pub fn emit(&self, event: Event) {
        let reportable = event.kind != EventKind::SubscriberOverflow;
        let event = Arc::new(event);

        for q in &self.queues {
            let cause = match q.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if reportable {
                tracing::warn!(subscriber = q.name, cause, kind = ?event.kind, "event not delivered");
                self.bus.publish(Event::subscriber_overflow(q.name, cause));
            }
        }
    }

    /// Closes the queues and waits until every worker has consumed its backlog.
    pub async fn shutdown(self) {
        drop(self.queues);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

fn spawn_worker(sub: Arc<dyn Subscribe>, bus: Bus) -> (Queue, JoinHandle<()>) {
    let name = sub.name();
    let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));

    let worker = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            let delivered = std::panic::AssertUnwindSafe(sub.on_event(&ev))
                .catch_unwind()
                .await;
            if let Err(payload) = delivered {
                let info = panic_message(payload.as_ref());
                tracing::warn!(subscriber = name, %info, "subscriber panicked");
                bus.publish(Event::subscriber_panicked(name, info));
            }
        }
    });
    (Queue { name, tx }, worker)
}
