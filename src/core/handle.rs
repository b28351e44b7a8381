//! # LifecycleHandle: the registration surface shared with keeper code.
//!
//! A cheap, cloneable handle over the lifecycle's shared runtime. Hooks receive
//! one; callbacks can capture one.
//!
//! ## Registration timing
//! ```text
//! before run / during startup hook ──► queued ──┐
//!                                               ├─► applied right after the startup hook
//! once running (callbacks, shutdown hook) ──────┴─► applied immediately
//! ```
//!
//! - `on_block`: at most one per lifecycle; spawns a [`BlockWatcher`] registered
//!   in the [`FilterRegistry`].
//! - `every`: spawns a [`PeriodicTask`] tied to the runtime token.
//! - `terminate`: sends an internal termination request, applied at the next tick.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::callbacks::{AsyncCallback, CallbackRef};
use crate::core::{
    config::Config,
    periodic::PeriodicTask,
    registry::{FilterRegistry, WatchHandle},
    state::{LifecycleState, Termination},
    watcher::{BLOCK_WATCHER, BlockWatcher},
};
use crate::error::RegistrationError;
use crate::events::{Bus, Event, EventKind};
use crate::node::{Block, NodeRef};

enum Registration {
    Block(Arc<AsyncCallback<Block>>),
    Periodic(PeriodicTask),
}

/// Runtime pieces shared by the lifecycle and every handle.
pub(crate) struct Shared {
    pub cfg: Config,
    pub node: NodeRef,
    pub bus: Bus,
    pub state: Arc<LifecycleState>,
    pub registry: Arc<FilterRegistry>,
    /// Cancelled when shutdown begins; periodic tasks hold child tokens.
    pub runtime_token: CancellationToken,
    pub requests: mpsc::UnboundedSender<Termination>,
    pub block_callback: OnceLock<Arc<AsyncCallback<Block>>>,
    pending: Mutex<Option<Vec<Registration>>>,
    periodic_seq: AtomicUsize,
}

impl Shared {
    pub fn new(
        cfg: Config,
        node: NodeRef,
        bus: Bus,
        requests: mpsc::UnboundedSender<Termination>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cfg,
            node,
            registry: FilterRegistry::new(bus.clone()),
            bus,
            state: Arc::new(LifecycleState::default()),
            runtime_token: CancellationToken::new(),
            requests,
            block_callback: OnceLock::new(),
            pending: Mutex::new(Some(Vec::new())),
            periodic_seq: AtomicUsize::new(0),
        })
    }

    /// Starts everything queued so far; later registrations apply immediately.
    pub async fn apply_pending(&self) {
        let queued = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        for registration in queued {
            match registration {
                Registration::Block(callback) => self.start_watcher(callback).await,
                Registration::Periodic(task) => self.start_periodic(task),
            }
        }
    }

    /// Queues `registration` while not running yet; hands it back otherwise.
    fn queue(&self, registration: Registration) -> Option<Registration> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.as_mut() {
            Some(queue) => {
                queue.push(registration);
                None
            }
            None => Some(registration),
        }
    }

    async fn start_watcher(&self, callback: Arc<AsyncCallback<Block>>) {
        if self.runtime_token.is_cancelled() {
            return;
        }
        let watcher = BlockWatcher::new(
            Arc::clone(&self.node),
            self.bus.clone(),
            Arc::clone(&self.state),
            callback,
        );
        let token = CancellationToken::new();
        let handle = WatchHandle::spawn(BLOCK_WATCHER, token.clone(), watcher.watch(token));
        self.registry.register(handle).await;
        self.bus.publish(Event::new(EventKind::WatchingBlocks).with_task(BLOCK_WATCHER));
    }

    fn start_periodic(&self, task: PeriodicTask) {
        self.bus.publish(
            Event::new(EventKind::PeriodicScheduled)
                .with_task(Arc::clone(task.name()))
                .with_elapsed(task.interval()),
        );
        self.state.mark_periodic();
        tokio::spawn(task.run(self.runtime_token.child_token()));
    }
}

/// Cloneable handle to a [`Lifecycle`](crate::Lifecycle).
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use keepervisor::{CallbackError, CallbackFn, CallbackRef, LifecycleHandle};
///
/// // Startup hook registering a periodic task.
/// let startup: CallbackRef<LifecycleHandle> = CallbackFn::arc(|lifecycle: LifecycleHandle| async move {
///     lifecycle.every(
///         Duration::from_secs(60),
///         CallbackFn::arc(|_: ()| async { Ok(()) }),
///     )?;
///     Ok::<(), CallbackError>(())
/// });
/// # let _ = startup;
/// ```
#[derive(Clone)]
pub struct LifecycleHandle {
    inner: Arc<Shared>,
}

impl LifecycleHandle {
    pub(crate) fn new(inner: Arc<Shared>) -> Self {
        Self { inner }
    }

    /// Registers the block callback.
    ///
    /// The callback runs once per fresh block, never concurrently with itself;
    /// blocks arriving while it runs are dropped.
    ///
    /// # Errors
    /// [`RegistrationError::BlockCallbackExists`] if a block callback was
    /// already registered on this lifecycle.
    pub async fn on_block(&self, callback: CallbackRef<Block>) -> Result<(), RegistrationError> {
        let callback = Arc::new(AsyncCallback::new(callback));
        self.inner
            .block_callback
            .set(Arc::clone(&callback))
            .map_err(|_| RegistrationError::BlockCallbackExists)?;

        if let Some(Registration::Block(callback)) = self.inner.queue(Registration::Block(callback)) {
            self.inner.start_watcher(callback).await;
        }
        Ok(())
    }

    /// Runs `callback` every `interval`, first after `Config::periodic_warmup`.
    ///
    /// # Errors
    /// [`RegistrationError::ZeroInterval`] if `interval` is zero.
    pub fn every(&self, interval: Duration, callback: CallbackRef<()>) -> Result<(), RegistrationError> {
        if interval.is_zero() {
            return Err(RegistrationError::ZeroInterval);
        }
        let seq = self.inner.periodic_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let task = PeriodicTask::new(
            format!("periodic#{seq}"),
            interval,
            self.inner.cfg.periodic_warmup,
            callback,
            self.inner.bus.clone(),
        );

        if let Some(Registration::Periodic(task)) = self.inner.queue(Registration::Periodic(task)) {
            self.inner.start_periodic(task);
        }
        Ok(())
    }

    /// Asks the lifecycle to terminate gracefully (clean exit).
    ///
    /// Takes effect at the next supervisory tick.
    pub fn terminate(&self) {
        let _ = self.inner.requests.send(Termination::Internal);
    }

    /// True once a termination request has been applied.
    pub fn is_terminating(&self) -> bool {
        self.inner.state.is_terminating()
    }

    /// The node this lifecycle supervises.
    pub fn node(&self) -> &NodeRef {
        &self.inner.node
    }
}
