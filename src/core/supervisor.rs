//! # Lifecycle: startup checks, supervisory loop, and ordered shutdown.
//!
//! The [`Lifecycle`] owns the event bus, the watch registry, the termination
//! channel and the hooks. [`Lifecycle::run`] drives one keeper process from
//! connection to exit status.
//!
//! ## Key responsibilities
//! - subscribe to the [`Bus`](crate::Bus) and **fan-out** events via [`SubscriberSet`]
//! - refuse to start with a locked account; wait for peers and sync
//! - apply queued `on_block` / `every` registrations after the startup hook
//! - merge internal, external and fatal termination into one shutdown path
//! - stop watchers, wait for the in-flight block callback, run the shutdown hook
//!
//! ## High-level architecture
//! ```text
//! run()
//!   ├─ subscriber_listener: Bus.subscribe() ─► SubscriberSet::emit(Event)
//!   │
//!   ├─ Starting
//!   │    Connected, OperatingAs
//!   │    node.sign(account, "test") ── Err ──► AccountLocked ──► PreconditionFailed (exit 255)
//!   │    wait_until_ready(): peer_count > 0, then !is_syncing  (poll every readiness_poll)
//!   │    KeeperStarted
//!   │    install signal listener ─► forward_signals ─► mpsc<Termination>
//!   │    startup hook ── Err ──► HookFailed, fatal, skip the loop
//!   │    apply_pending(): watchers ─► FilterRegistry, periodic ─► runtime_token children
//!   │
//!   ├─ Running (only with a watcher or a periodic task), every `tick`:
//!   │    drain(mpsc<Termination>)
//!   │    a. internal          ─► TerminationRequested       (clean)
//!   │    b. external          ─► TerminatingOnSignal        (clean)
//!   │    c. dead watcher      ─► WatcherDead                (fatal)
//!   │    d. stale, not syncing ─► BlocksStale               (fatal)
//!   │
//!   ├─ ShuttingDown
//!   │    runtime_token.cancel()                 (periodic tasks stop at next scheduling point)
//!   │    StoppingWatchers ─► registry.stop_all()
//!   │    WaitingForCallback ─► block_callback.wait()
//!   │    ShutdownHookStarted ─► shutdown hook ─► ShutdownHookFinished
//!   │
//!   └─ Terminated(code) ─► flush subscribers ─► Ok(Outcome)
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use keepervisor::{Block, CallbackFn, Config, Lifecycle, LogWriter, NodeRef, Subscribe};
//!
//! async fn keeper(node: NodeRef) -> Result<std::process::ExitCode, Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let lifecycle = Lifecycle::builder(Config::default(), node)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     lifecycle
//!         .on_block(CallbackFn::arc(|block: Block| async move {
//!             println!("new block {block}");
//!             Ok(())
//!         }))
//!         .await?;
//!
//!     let outcome = lifecycle.run().await?;
//!     Ok(outcome.into())
//! }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    builder::LifecycleBuilder,
    handle::{LifecycleHandle, Shared},
    outcome::Outcome,
    shutdown,
    state::Termination,
};
use crate::callbacks::CallbackRef;
use crate::error::{CallbackError, KeeperError, RegistrationError};
use crate::events::{Event, EventKind};
use crate::node::{Block, NodeRef};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::Config;

/// Message the account must be able to sign before the keeper starts.
const SIGN_PROBE: &[u8] = b"test";

/// Supervises one keeper process.
pub struct Lifecycle {
    shared: Arc<Shared>,
    requests: mpsc::UnboundedReceiver<Termination>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    startup: Option<CallbackRef<LifecycleHandle>>,
    shutdown: Option<CallbackRef<LifecycleHandle>>,
}

impl Lifecycle {
    /// Starts building a lifecycle supervising `node`.
    pub fn builder(cfg: Config, node: NodeRef) -> LifecycleBuilder {
        LifecycleBuilder::new(cfg, node)
    }

    pub(crate) fn new_internal(
        shared: Arc<Shared>,
        requests: mpsc::UnboundedReceiver<Termination>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        Self {
            shared,
            requests,
            subscribers,
            startup: None,
            shutdown: None,
        }
    }

    /// Returns a handle for registrations and termination requests.
    pub fn handle(&self) -> LifecycleHandle {
        LifecycleHandle::new(Arc::clone(&self.shared))
    }

    /// Sets the hook run once the node is ready, before the loop starts.
    ///
    /// A failing hook makes the run fatal; the shutdown sequence still runs.
    pub fn on_startup(&mut self, hook: CallbackRef<LifecycleHandle>) {
        self.startup = Some(hook);
    }

    /// Sets the hook run last in the shutdown sequence.
    pub fn on_shutdown(&mut self, hook: CallbackRef<LifecycleHandle>) {
        self.shutdown = Some(hook);
    }

    /// Registers the block callback. See [`LifecycleHandle::on_block`].
    pub async fn on_block(&self, callback: CallbackRef<Block>) -> Result<(), RegistrationError> {
        self.handle().on_block(callback).await
    }

    /// Registers a periodic task. See [`LifecycleHandle::every`].
    pub fn every(&self, interval: Duration, callback: CallbackRef<()>) -> Result<(), RegistrationError> {
        self.handle().every(interval, callback)
    }

    /// Runs the keeper until it terminates and returns how it ended.
    ///
    /// # Errors
    /// - [`KeeperError::NodeNotReady`] if `readiness_timeout` elapsed first
    /// - [`KeeperError::SignalRegistration`] if signal listeners could not be installed
    pub async fn run(mut self) -> Result<Outcome, KeeperError> {
        let rx = self.shared.bus.subscribe();
        let set = SubscriberSet::new(std::mem::take(&mut self.subscribers), self.shared.bus.clone());
        let listener_token = CancellationToken::new();
        let listener = tokio::spawn(subscriber_listener(rx, set, listener_token.clone()));

        let res = self.drive().await;

        listener_token.cancel();
        let _ = listener.await;
        res
    }

    async fn drive(&mut self) -> Result<Outcome, KeeperError> {
        let s = Arc::clone(&self.shared);

        s.bus
            .publish(Event::new(EventKind::Connected).with_reason(s.node.endpoint()));
        s.bus
            .publish(Event::new(EventKind::OperatingAs).with_reason(s.node.account()));

        if let Err(e) = s.node.sign(s.node.account(), SIGN_PROBE).await {
            s.bus.publish(
                Event::new(EventKind::AccountLocked)
                    .with_reason(format!("{}: {e}", s.node.account())),
            );
            return Ok(Outcome::PreconditionFailed);
        }

        self.wait_until_ready().await?;
        s.bus.publish(Event::new(EventKind::KeeperStarted));

        let signals_token = CancellationToken::new();
        let _signals_guard = signals_token.clone().drop_guard();
        if s.cfg.handle_signals {
            let signals = shutdown::os_signals()?;
            tokio::spawn(shutdown::forward_signals(
                signals,
                s.bus.clone(),
                s.requests.clone(),
                signals_token,
            ));
        }

        let started = match self.startup.clone() {
            Some(hook) => self.run_hook("startup", hook).await,
            None => true,
        };

        if started {
            s.apply_pending().await;
            if s.registry.any_present().await || s.state.has_periodic() {
                self.supervise().await;
            }
        }

        self.shutdown_sequence().await;

        let outcome = if s.state.is_fatal() {
            Outcome::Fatal
        } else {
            Outcome::Clean
        };
        s.bus
            .publish(Event::new(EventKind::Terminated).with_code(i32::from(outcome.exit_code())));
        Ok(outcome)
    }

    /// Polls until the node has a peer and is no longer syncing.
    async fn wait_until_ready(&self) -> Result<(), KeeperError> {
        let s = &self.shared;
        let started = Instant::now();

        let mut announced = false;
        loop {
            match s.node.peer_count().await {
                Ok(peers) if peers > 0 => break,
                Ok(_) if !announced => {
                    announced = true;
                    s.bus.publish(Event::new(EventKind::WaitingForPeers));
                }
                Ok(_) => {}
                Err(e) => s
                    .bus
                    .publish(Event::new(EventKind::NodeUnavailable).with_reason(e.to_string())),
            }
            self.readiness_pause(started).await?;
        }

        let mut announced = false;
        loop {
            match s.node.is_syncing().await {
                Ok(false) => break,
                Ok(true) if !announced => {
                    announced = true;
                    s.bus.publish(Event::new(EventKind::WaitingForSync));
                }
                Ok(true) => {}
                Err(e) => s
                    .bus
                    .publish(Event::new(EventKind::NodeUnavailable).with_reason(e.to_string())),
            }
            self.readiness_pause(started).await?;
        }
        Ok(())
    }

    async fn readiness_pause(&self, started: Instant) -> Result<(), KeeperError> {
        if let Some(limit) = self.shared.cfg.readiness_deadline() {
            let waited = started.elapsed();
            if waited >= limit {
                return Err(KeeperError::NodeNotReady { waited });
            }
        }
        tokio::time::sleep(self.shared.cfg.readiness_poll).await;
        Ok(())
    }

    /// The supervisory loop; returns once a termination condition holds.
    async fn supervise(&mut self) {
        let s = Arc::clone(&self.shared);
        loop {
            tokio::time::sleep(s.cfg.tick).await;
            s.state.drain(&mut self.requests);

            if s.state.terminated_internally() {
                s.bus.publish(Event::new(EventKind::TerminationRequested));
                return;
            }

            if s.state.terminated_externally() {
                s.bus.publish(Event::new(EventKind::TerminatingOnSignal));
                return;
            }

            if !s.registry.all_alive().await {
                let dead = s.registry.dead().await;
                s.bus
                    .publish(Event::new(EventKind::WatcherDead).with_task(dead.join(", ")));
                s.state.mark_fatal();
                return;
            }

            if let Some(at) = s.state.last_block_at() {
                let age = at.elapsed();
                if age > s.cfg.stale_after && !s.node.is_syncing().await.unwrap_or(false) {
                    s.bus
                        .publish(Event::new(EventKind::BlocksStale).with_elapsed(age));
                    s.state.mark_fatal();
                    return;
                }
            }
        }
    }

    async fn shutdown_sequence(&self) {
        let s = &self.shared;
        s.bus.publish(Event::new(EventKind::ShuttingDown));
        s.runtime_token.cancel();

        if s.registry.any_present().await {
            s.bus.publish(Event::new(EventKind::StoppingWatchers));
            s.registry.stop_all().await;
        }

        if let Some(callback) = s.block_callback.get() {
            s.bus.publish(Event::new(EventKind::WaitingForCallback));
            callback.wait().await;
        }

        if let Some(hook) = self.shutdown.clone() {
            s.bus.publish(Event::new(EventKind::ShutdownHookStarted));
            self.run_hook("shutdown", hook).await;
            s.bus.publish(Event::new(EventKind::ShutdownHookFinished));
        }
    }

    /// Runs a hook, catching errors and panics. Returns `false` on failure.
    async fn run_hook(&self, name: &'static str, hook: CallbackRef<LifecycleHandle>) -> bool {
        let res = AssertUnwindSafe(hook.call(self.handle()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(CallbackError::from_panic(panic)));

        match res {
            Ok(()) => true,
            Err(e) => {
                self.shared.bus.publish(
                    Event::new(EventKind::HookFailed)
                        .with_task(name)
                        .with_reason(e.to_string()),
                );
                self.shared.state.mark_fatal();
                false
            }
        }
    }
}

/// Forwards bus events to the subscriber set until cancelled, then drains
/// what is left and flushes the subscribers.
async fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(ev) => set.emit(ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = token.cancelled() => {
                loop {
                    match rx.try_recv() {
                        Ok(ev) => set.emit(ev),
                        Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }
                break;
            }
        }
    }
    set.shutdown().await;
}
