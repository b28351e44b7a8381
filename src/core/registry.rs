//! # Watch registry: supervised event subscriptions.
//!
//! Every block watcher runs as a spawned task wrapped in a [`WatchHandle`] and
//! registered in the lifecycle's [`FilterRegistry`]. The supervisory loop polls
//! the registry each tick; a dead handle means the stream can no longer deliver
//! events and the keeper must be restarted.
//!
//! ## Architecture
//! ```text
//! on_block() ──► WatchHandle::spawn(watcher.run(token)) ──► FilterRegistry::register
//!
//! tick ──► FilterRegistry::all_alive()  ── false ──► fatal shutdown
//!
//! shutdown ──► FilterRegistry::stop_all()
//!                 ├─► drain the set (registry is empty afterwards)
//!                 └─► for each: stop() ── Err ──► WatcherStopFailed, continue
//! ```
//!
//! ## Rules
//! - Registration is append-only while running; only `stop_all` removes handles.
//! - `stop()` is idempotent; a stopped handle always reports dead.
//! - Stopping is best-effort: one failing handle never prevents stopping the rest.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::events::{Bus, Event, EventKind};

/// A supervised subscription with a liveness predicate.
#[async_trait]
pub(crate) trait Watch: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// False once the underlying stream died or the watch was stopped.
    fn is_alive(&self) -> bool;

    /// Stops the watch and waits for it to wind down. Idempotent.
    async fn stop(&self) -> Result<(), WatchError>;
}

/// Watch backed by a spawned tokio task.
pub(crate) struct WatchHandle {
    name: String,
    token: CancellationToken,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl WatchHandle {
    /// Spawns `fut` and returns its handle.
    ///
    /// `fut` must observe `token` and return once it is cancelled.
    pub fn spawn<F>(name: impl Into<String>, token: CancellationToken, fut: F) -> Arc<Self>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            token,
            join: Mutex::new(Some(tokio::spawn(fut))),
        })
    }
}

#[async_trait]
impl Watch for WatchHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_alive(&self) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        match self.join.lock() {
            Ok(join) => join.as_ref().is_some_and(|j| !j.is_finished()),
            Err(_) => false,
        }
    }

    async fn stop(&self) -> Result<(), WatchError> {
        self.token.cancel();
        let join = self.join.lock().ok().and_then(|mut j| j.take());

        match join {
            Some(join) => match join.await {
                Err(e) if e.is_panic() => Err(WatchError::Panicked {
                    name: self.name.clone(),
                }),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }
}

/// Set of active watches, owned by the lifecycle.
pub(crate) struct FilterRegistry {
    watches: RwLock<Vec<Arc<dyn Watch>>>,
    bus: Bus,
}

impl FilterRegistry {
    pub fn new(bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            watches: RwLock::new(Vec::new()),
            bus,
        })
    }

    /// Adds a watch to the supervised set.
    pub async fn register(&self, watch: Arc<dyn Watch>) {
        self.watches.write().await.push(watch);
    }

    /// True if at least one watch is registered.
    pub async fn any_present(&self) -> bool {
        !self.watches.read().await.is_empty()
    }

    /// True if every registered watch is alive (vacuously true when empty).
    pub async fn all_alive(&self) -> bool {
        self.watches.read().await.iter().all(|w| w.is_alive())
    }

    /// Names of the registered watches that are dead.
    pub async fn dead(&self) -> Vec<String> {
        self.watches
            .read()
            .await
            .iter()
            .filter(|w| !w.is_alive())
            .map(|w| w.name().to_string())
            .collect()
    }

    /// Stops every registered watch (best-effort) and clears the set.
    pub async fn stop_all(&self) {
        let watches: Vec<Arc<dyn Watch>> = {
            let mut set = self.watches.write().await;
            set.drain(..).collect()
        };

        for watch in watches {
            if let Err(e) = watch.stop().await {
                self.bus.publish(
                    Event::new(EventKind::WatcherStopFailed)
                        .with_task(watch.name())
                        .with_reason(e.to_string()),
                );
            }
        }
    }
}
