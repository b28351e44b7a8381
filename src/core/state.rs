//! # Shared lifecycle state.
//!
//! Flags written by the supervisory loop and read by handles, watchers and
//! tests. Termination requests never write the flags directly: they travel on
//! an unbounded channel and are applied by the loop at the next tick.
//!
//! ```text
//! signal listener ──┐
//!                   ├──► mpsc<Termination> ──► tick: drain() ──► terminated_* flags
//! handle.terminate ─┘
//! ```

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Origin of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    /// Keeper logic asked to stop.
    Internal,
    /// SIGINT/SIGTERM (or an equivalent) was received.
    External,
}

/// Mutable state of one lifecycle, shared behind an `Arc`.
#[derive(Default)]
pub(crate) struct LifecycleState {
    terminated_internally: AtomicBool,
    terminated_externally: AtomicBool,
    fatal: AtomicBool,
    has_periodic: AtomicBool,
    last_block_at: Mutex<Option<Instant>>,
}

impl LifecycleState {
    pub fn terminated_internally(&self) -> bool {
        self.terminated_internally.load(Ordering::Acquire)
    }

    pub fn terminated_externally(&self) -> bool {
        self.terminated_externally.load(Ordering::Acquire)
    }

    pub fn is_terminating(&self) -> bool {
        self.terminated_internally() || self.terminated_externally()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    pub fn mark_fatal(&self) {
        self.fatal.store(true, Ordering::Release);
    }

    pub fn has_periodic(&self) -> bool {
        self.has_periodic.load(Ordering::Acquire)
    }

    pub fn mark_periodic(&self) {
        self.has_periodic.store(true, Ordering::Release);
    }

    /// Records the arrival of a raw block event.
    pub fn touch_block(&self) {
        *self
            .last_block_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    pub fn last_block_at(&self) -> Option<Instant> {
        *self
            .last_block_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies every pending termination request.
    pub fn drain(&self, rx: &mut mpsc::UnboundedReceiver<Termination>) {
        while let Ok(req) = rx.try_recv() {
            match req {
                Termination::Internal => {
                    self.terminated_internally.store(true, Ordering::Release)
                }
                Termination::External => {
                    self.terminated_externally.store(true, Ordering::Release)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_apply_only_when_drained() {
        let state = LifecycleState::default();
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(Termination::External).unwrap();
        assert!(!state.is_terminating());

        state.drain(&mut rx);
        assert!(state.terminated_externally());
        assert!(!state.terminated_internally());

        tx.send(Termination::Internal).unwrap();
        tx.send(Termination::Internal).unwrap();
        state.drain(&mut rx);
        assert!(state.terminated_internally());
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_block_records_latest_arrival() {
        let state = LifecycleState::default();
        assert_eq!(state.last_block_at(), None);

        state.touch_block();
        let first = state.last_block_at().unwrap();
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        state.touch_block();

        assert!(state.last_block_at().unwrap() > first);
    }

    #[test]
    fn test_block_time_survives_a_poisoned_lock() {
        let state = LifecycleState::default();
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _held = state.last_block_at.lock().unwrap();
                    panic!("poison");
                })
                .join();
        });
        assert!(state.last_block_at.is_poisoned());

        state.touch_block();
        assert!(state.last_block_at().is_some());
    }
}
