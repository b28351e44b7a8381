//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the lifecycle, block
//! watchers, periodic tasks and the signal listener.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Lifecycle`, `BlockWatcher`, `PeriodicTask`, the signal
//!   listener, `FilterRegistry::stop_all`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the subscriber listener spawned by `Lifecycle::run`, which
//!   fans out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
