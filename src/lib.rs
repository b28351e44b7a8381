//! # keepervisor
//!
//! **Keepervisor** is a lifecycle supervisor for keeper bots: long-running
//! processes that react to new blocks and periodic timers of a block-producing
//! node.
//!
//! It does not know anything about chains. It schedules the callbacks supplied
//! by keeper code and guarantees:
//! - at most one block callback runs at a time (blocks arriving meanwhile are dropped);
//! - a dead block stream is detected and turned into a fatal exit;
//! - a silent stall (no blocks for too long while the node is not syncing) is fatal too;
//! - internal, external (signal) and fatal termination share one shutdown path,
//!   which waits for in-flight work before the shutdown hook runs.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!        ┌──────────────┐        ┌──────────────┐        ┌──────────────┐
//!        │   on_block   │        │    every     │        │ startup/     │
//!        │  (callback)  │        │  (callback)  │        │ shutdown hook│
//!        └──────┬───────┘        └──────┬───────┘        └──────┬───────┘
//!               ▼                       ▼                       ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  Lifecycle (runtime orchestrator)                                     │
//! │  - Bus (broadcast events)                                             │
//! │  - FilterRegistry (supervised watches)                                │
//! │  - LifecycleState (termination flags, last block time)                │
//! │  - SubscriberSet (fans out to user subscribers)                       │
//! └──────┬──────────────────────────┬──────────────────────────┬──────────┘
//!        ▼                          ▼                          ▼
//!  ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//!  │ BlockWatcher │          │ PeriodicTask │          │ signal       │
//!  │ (per stream) │          │ (per every)  │          │ listener     │
//!  └──────┬───────┘          └──────┬───────┘          └──────┬───────┘
//!         │ AsyncCallback           │ sleep/run/reschedule    │ mpsc<Termination>
//!         │ (single-flight)         │                         │ (drained each tick)
//!         ▼                         ▼                         ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                        │
//! │                    (capacity: Config::bus_capacity)                   │
//! └───────────────────────────────────┬───────────────────────────────────┘
//!                                     ▼
//!                         ┌────────────────────────┐
//!                         │  subscriber_listener   │
//!                         │   (in Lifecycle::run)  │
//!                         └───────────┬────────────┘
//!                                     ▼
//!                               SubscriberSet
//!                              (per-sub queues)
//!                          ┌──────────┼──────────┐
//!                          ▼          ▼          ▼
//!                      LogWriter   Metrics    Custom
//! ```
//!
//! ### Lifecycle
//! ```text
//! Constructed ──► Starting ──► Running ──► ShuttingDown ──► Terminated(code)
//!                    │
//!                    └── account locked ──► PreconditionFailed (exit 255)
//!
//! Running, every tick:
//!   internal request ─► clean    external signal ─► clean
//!   dead watcher     ─► fatal    stale blocks    ─► fatal
//!
//! ShuttingDown:
//!   cancel periodic ─► stop watchers ─► wait for block callback ─► shutdown hook
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                           |
//! |-------------------|---------------------------------------------------------------|----------------------------------------------|
//! | **Lifecycle**     | Startup checks, supervision loop, ordered shutdown.           | [`Lifecycle`], [`LifecycleHandle`]           |
//! | **Callbacks**     | Keeper logic as closures or structs; single-flight wrapper.   | [`Callback`], [`CallbackFn`], [`AsyncCallback`] |
//! | **Node**          | The opaque block source the runtime consumes.                 | [`Node`], [`Block`], [`BlockStream`]         |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, alerts).        | [`Subscribe`], [`LogWriter`]                 |
//! | **Errors**        | Typed errors for the runtime, node and callbacks.             | [`KeeperError`], [`NodeError`], [`CallbackError`] |
//! | **Configuration** | Centralize timing settings.                                   | [`Config`]                                   |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use keepervisor::{Block, CallbackFn, Config, Lifecycle, LogWriter, NodeRef, Subscribe};
//!
//! async fn keeper(node: NodeRef) -> std::process::ExitCode {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let lifecycle = Lifecycle::builder(Config::default(), node)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     lifecycle
//!         .on_block(CallbackFn::arc(|block: Block| async move {
//!             // check auctions, bid, ...
//!             let _ = block;
//!             Ok(())
//!         }))
//!         .await
//!         .expect("first block callback");
//!     lifecycle
//!         .every(Duration::from_secs(60), CallbackFn::arc(|_: ()| async { Ok(()) }))
//!         .expect("non-zero interval");
//!
//!     match lifecycle.run().await {
//!         Ok(outcome) => outcome.into(),
//!         Err(e) => {
//!             eprintln!("keeper failed to start: {e}");
//!             std::process::ExitCode::FAILURE
//!         }
//!     }
//! }
//! ```

mod callbacks;
mod core;
mod error;
mod events;
mod node;
mod subscribers;

#[cfg(test)]
mod test_support;

// ---- Public re-exports ----

pub use callbacks::{AsyncCallback, BoxCallbackFuture, Callback, CallbackFn, CallbackRef};
pub use core::{Config, Lifecycle, LifecycleBuilder, LifecycleHandle, Outcome};
pub use error::{CallbackError, KeeperError, NodeError, RegistrationError, WatchError};
pub use events::{Bus, Event, EventKind};
pub use node::{Block, BlockHash, BlockStream, Node, NodeRef};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
