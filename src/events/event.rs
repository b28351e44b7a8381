//! # Runtime events emitted by the lifecycle, watchers and periodic tasks.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Startup events**: connection info, precondition and readiness checks
//! - **Block events**: what the block watcher did with each new block
//! - **Termination events**: signals, internal requests, fatal conditions
//! - **Shutdown events**: each step of the shutdown sequence
//!
//! The [`Event`] struct carries additional metadata such as timestamps, block
//! numbers, task names and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use keepervisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::BlockIgnoredSuperseded)
//!     .with_block(41, "0xabc")
//!     .with_max_block(42);
//!
//! assert_eq!(ev.kind, EventKind::BlockIgnoredSuperseded);
//! assert_eq!(ev.block, Some(41));
//! assert_eq!(ev.hash.as_deref(), Some("0xabc"));
//! assert_eq!(ev.max_block, Some(42));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    // === Startup events ===
    /// Keeper is connected to a node.
    ///
    /// Sets: `reason` (node endpoint).
    Connected,

    /// Keeper signs as the given account.
    ///
    /// Sets: `reason` (account).
    OperatingAs,

    /// The account could not sign a test message; the keeper aborts.
    ///
    /// Sets: `reason` (account and node error).
    AccountLocked,

    /// The node has no peers yet; startup is blocked until it has one.
    WaitingForPeers,

    /// The node is syncing; startup is blocked until it finishes.
    WaitingForSync,

    /// A readiness query failed; polling continues.
    ///
    /// Sets: `reason` (node error).
    NodeUnavailable,

    /// Startup checks passed.
    KeeperStarted,

    /// A startup or shutdown hook failed.
    ///
    /// Sets: `task` (`"startup"` / `"shutdown"`), `reason`.
    HookFailed,

    // === Registration events ===
    /// A block watcher was subscribed and registered.
    ///
    /// Sets: `task` (watcher name).
    WatchingBlocks,

    /// A periodic task was scheduled.
    ///
    /// Sets: `task` (periodic task name), `elapsed_ms` (interval).
    PeriodicScheduled,

    /// A periodic callback failed; the task is rescheduled anyway.
    ///
    /// Sets: `task`, `reason`.
    PeriodicFailed,

    // === Block events ===
    /// Block callback is starting.
    ///
    /// Sets: `block`, `hash`.
    BlockProcessing,

    /// Block callback finished.
    ///
    /// Sets: `block`, `hash`.
    BlockProcessed,

    /// Block callback returned an error or panicked.
    ///
    /// Sets: `block`, `hash`, `reason`.
    BlockCallbackFailed,

    /// Block dropped because the previous callback is still running.
    ///
    /// Sets: `block`, `hash`.
    BlockIgnoredBusy,

    /// Block dropped because a newer block is already available.
    ///
    /// Sets: `block`, `hash`, `max_block`.
    BlockIgnoredSuperseded,

    /// Block dropped because it was already handed to the callback.
    ///
    /// Sets: `block`, `hash`.
    BlockIgnoredDuplicate,

    /// Block dropped because the node is syncing.
    ///
    /// Sets: `block`, `hash`.
    BlockIgnoredSyncing,

    /// A watcher task ended on its own (stream error, stream end, node error).
    ///
    /// Sets: `task` (watcher name), `reason`.
    WatcherFailed,

    // === Termination events ===
    /// First SIGINT/SIGTERM observed; graceful termination requested.
    ///
    /// Sets: `reason` (signal name).
    SignalReceived,

    /// Another signal arrived while termination is already in progress.
    ///
    /// Sets: `reason` (signal name).
    SignalRepeated,

    /// Keeper logic asked for termination.
    TerminationRequested,

    /// The loop is breaking because of a received signal.
    TerminatingOnSignal,

    /// One of the watchers is dead; fatal termination.
    ///
    /// Sets: `task` (dead watcher names).
    WatcherDead,

    /// No new block for longer than the staleness threshold; fatal termination.
    ///
    /// Sets: `elapsed_ms` (time since the last block).
    BlocksStale,

    // === Shutdown events ===
    /// Shutdown sequence started.
    ShuttingDown,

    /// Stopping all registered watchers.
    StoppingWatchers,

    /// A watcher failed to stop cleanly; the remaining ones are still stopped.
    ///
    /// Sets: `task` (watcher name), `reason`.
    WatcherStopFailed,

    /// Waiting for the in-flight block callback to finish.
    WaitingForCallback,

    /// Shutdown hook is starting.
    ShutdownHookStarted,

    /// Shutdown hook finished.
    ShutdownHookFinished,

    /// Keeper terminated.
    ///
    /// Sets: `code` (process exit status).
    Terminated,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Block number, if applicable.
    pub block: Option<u64>,
    /// Block hash, if applicable.
    pub hash: Option<Arc<str>>,
    /// Highest block number known to the node (for superseded blocks).
    pub max_block: Option<u64>,
    /// Name of the watcher, periodic task or hook.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, endpoint, signal name, etc.).
    pub reason: Option<Arc<str>>,
    /// Exit status (for `Terminated`).
    pub code: Option<i32>,
    /// Duration in milliseconds (interval or staleness age).
    pub elapsed_ms: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            block: None,
            hash: None,
            max_block: None,
            task: None,
            reason: None,
            code: None,
            elapsed_ms: None,
        }
    }

    /// Attaches a block number and hash.
    #[inline]
    pub fn with_block(mut self, number: u64, hash: impl Into<Arc<str>>) -> Self {
        self.block = Some(number);
        self.hash = Some(hash.into());
        self
    }

    /// Attaches the node's highest known block number.
    #[inline]
    pub fn with_max_block(mut self, max: u64) -> Self {
        self.max_block = Some(max);
        self
    }

    /// Attaches a watcher / task / hook name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an exit status.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u64::MAX)) as u64;
        self.elapsed_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// True for events describing what happened to a single block.
    #[inline]
    pub fn is_block_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::BlockProcessing
                | EventKind::BlockProcessed
                | EventKind::BlockCallbackFailed
                | EventKind::BlockIgnoredBusy
                | EventKind::BlockIgnoredSuperseded
                | EventKind::BlockIgnoredDuplicate
                | EventKind::BlockIgnoredSyncing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::KeeperStarted);
        let b = Event::new(EventKind::KeeperStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_elapsed_is_stored_in_millis() {
        let ev = Event::new(EventKind::BlocksStale).with_elapsed(Duration::from_secs(301));
        assert_eq!(ev.elapsed_ms, Some(301_000));
        assert!(!ev.is_block_event());
    }

    #[test]
    fn test_block_event_classification() {
        let ev = Event::new(EventKind::BlockIgnoredBusy).with_block(7, "0x07");
        assert!(ev.is_block_event());
        assert_eq!(ev.block, Some(7));
    }
}
