//! # Single-flight wrapper around a callback.
//!
//! [`AsyncCallback`] guarantees that **at most one** invocation of the wrapped
//! callback is in flight at any time, for the lifetime of the handle.
//!
//! ```text
//! trigger(input, before, after)
//!     │
//!     ├─ running? ──yes──► return false   (before/after/callback not invoked)
//!     │
//!     └─ no ──► running = true
//!               before()                  (synchronously, in caller order)
//!               spawn ─► callback(input) ─► after(&result) ─► running = false
//!               return true
//!
//! wait() ──► resolves once running == false (immediately when idle)
//! ```
//!
//! ## Rules
//! - The running flag lives in a `watch` channel: check-and-set happens under
//!   the channel lock, so concurrent triggers cannot both win.
//! - Errors and panics from the callback are handed to `after`; the handle
//!   returns to idle either way (even if `after` itself panics).
//! - No queuing: a trigger that loses is simply dropped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;

use crate::callbacks::CallbackRef;
use crate::error::CallbackError;

/// Single-flight handle over a [`Callback`](crate::Callback).
pub struct AsyncCallback<T> {
    callback: CallbackRef<T>,
    running: Arc<watch::Sender<bool>>,
}

/// Clears the running flag when the invocation ends, however it ends.
struct IdleOnDrop(Arc<watch::Sender<bool>>);

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl<T: Send + 'static> AsyncCallback<T> {
    /// Wraps `callback`; the handle starts idle.
    pub fn new(callback: CallbackRef<T>) -> Self {
        let (running, _rx) = watch::channel(false);
        Self {
            callback,
            running: Arc::new(running),
        }
    }

    /// Starts the callback in the background unless an invocation is in flight.
    ///
    /// Returns `false` (and invokes nothing) if the previous invocation has not
    /// completed. Otherwise calls `before` synchronously, spawns the callback on
    /// the current tokio runtime and returns `true`; `after` receives the
    /// callback's result once it completes.
    pub fn trigger<B, A>(&self, input: T, before: B, after: A) -> bool
    where
        B: FnOnce(),
        A: FnOnce(&Result<(), CallbackError>) + Send + 'static,
    {
        let acquired = self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        if !acquired {
            return false;
        }

        let guard = IdleOnDrop(Arc::clone(&self.running));
        before();

        let callback = Arc::clone(&self.callback);
        tokio::spawn(async move {
            let _guard = guard;
            let res = AssertUnwindSafe(async move { callback.call(input).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(CallbackError::from_panic(panic)));
            after(&res);
        });
        true
    }

    /// Waits until no invocation is in flight.
    pub async fn wait(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// True while an invocation is in flight.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }
}
