//! # Periodic task: fixed-interval callback that survives its own failures.
//!
//! Each `every(interval, callback)` registration runs one [`PeriodicTask`] on
//! its own tokio task, driven by an explicit state machine:
//!
//! ```text
//!   Idle ──► Scheduled(warmup) ──► Running ──► Scheduled(interval) ──► Running ──► ...
//!                  │                  │               │
//!             cancelled?         Err/panic ──► PeriodicFailed (then reschedule anyway)
//!                  ▼                                   ▼
//!                exit                                exit
//! ```
//!
//! ## Rules
//! - Exactly one pending timer per task; the next firing is scheduled only
//!   after the current invocation completes (invocations never overlap).
//! - A running invocation is never preempted; cancellation is observed at the
//!   next scheduling point.
//! - Failures go to the bus (the error sink), never to the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::callbacks::CallbackRef;
use crate::error::CallbackError;
use crate::events::{Bus, Event, EventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeriodicState {
    Idle,
    Scheduled(Duration),
    Running,
}

pub(crate) struct PeriodicTask {
    name: Arc<str>,
    interval: Duration,
    warmup: Duration,
    callback: CallbackRef<()>,
    bus: Bus,
}

impl PeriodicTask {
    pub fn new(
        name: impl Into<Arc<str>>,
        interval: Duration,
        warmup: Duration,
        callback: CallbackRef<()>,
        bus: Bus,
    ) -> Self {
        Self {
            name: name.into(),
            interval,
            warmup,
            callback,
            bus,
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Drives the state machine until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let mut state = PeriodicState::Idle;
        loop {
            state = match state {
                PeriodicState::Idle => PeriodicState::Scheduled(self.warmup),
                PeriodicState::Scheduled(delay) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => PeriodicState::Running,
                    }
                }
                PeriodicState::Running => {
                    if let Err(e) = self.fire().await {
                        self.bus.publish(
                            Event::new(EventKind::PeriodicFailed)
                                .with_task(self.name.clone())
                                .with_reason(e.to_string()),
                        );
                    }
                    PeriodicState::Scheduled(self.interval)
                }
            };
        }
    }

    async fn fire(&self) -> Result<(), CallbackError> {
        AssertUnwindSafe(self.callback.call(()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CallbackError::from_panic(panic)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CallbackFn;
    use std::sync::Mutex;
    use tokio::time::Instant;

    fn recording(fail_first: bool, panic_first: bool) -> (CallbackRef<()>, Arc<Mutex<Vec<Instant>>>) {
        let firings = Arc::new(Mutex::new(Vec::new()));
        let f = firings.clone();
        let cb: CallbackRef<()> = CallbackFn::arc(move |_: ()| {
            let f = f.clone();
            async move {
                let first = {
                    let mut f = f.lock().unwrap();
                    f.push(Instant::now());
                    f.len() == 1
                };
                if first && panic_first {
                    panic!("first run exploded");
                }
                if first && fail_first {
                    return Err(CallbackError::fail("rpc timeout"));
                }
                Ok(())
            }
        });
        (cb, firings)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_stop_rescheduling() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let (cb, firings) = recording(true, false);
        let task = PeriodicTask::new(
            "periodic#1",
            Duration::from_secs(10),
            Duration::from_secs(1),
            cb,
            bus,
        );

        let start = Instant::now();
        let token = CancellationToken::new();
        let join = tokio::spawn(task.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(21_500)).await;
        token.cancel();
        join.await.unwrap();

        let offsets: Vec<u64> = firings
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(start).as_secs())
            .collect();
        assert_eq!(offsets, vec![1, 11, 21]);

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::PeriodicFailed);
        assert_eq!(ev.task.as_deref(), Some("periodic#1"));
        assert_eq!(ev.reason.as_deref(), Some("callback failed: rpc timeout"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_reported_and_rescheduled() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let (cb, firings) = recording(false, true);
        let task = PeriodicTask::new(
            "periodic#2",
            Duration::from_secs(1),
            Duration::from_secs(1),
            cb,
            bus,
        );

        let token = CancellationToken::new();
        let join = tokio::spawn(task.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        token.cancel();
        join.await.unwrap();

        assert_eq!(firings.lock().unwrap().len(), 2);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::PeriodicFailed);
        assert_eq!(ev.reason.as_deref(), Some("callback panicked: first run exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_warmup_never_fires() {
        let (cb, firings) = recording(false, false);
        let task = PeriodicTask::new(
            "periodic#3",
            Duration::from_secs(1),
            Duration::from_secs(1),
            cb,
            Bus::new(4),
        );

        let token = CancellationToken::new();
        let join = tokio::spawn(task.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        token.cancel();
        join.await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(firings.lock().unwrap().is_empty());
    }
}
