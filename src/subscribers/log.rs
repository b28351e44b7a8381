//! # LogWriter: leveled logging of runtime events
//!
//! A subscriber that renders incoming [`Event`]s through `tracing`, using the
//! level each keeper message deserves:
//!
//! | Level   | Events                                                                 |
//! |---------|------------------------------------------------------------------------|
//! | `debug` | block processing start/finish                                          |
//! | `info`  | startup, readiness waits, ignored blocks, registrations, shutdown steps |
//! | `warn`  | signals, termination requests, subscriber overflow/panic               |
//! | `error` | locked account, dead watchers, stale blocks, failed callbacks/hooks    |
//!
//! ## Example output (fmt layer)
//! ```text
//! INFO  keepervisor: Keeper connected to http://localhost:8545
//! DEBUG keepervisor: Processing block #42 (0x2a)
//! INFO  keepervisor: Ignoring block #42 (0x2a), as previous callback is still running
//! WARN  keepervisor: Keeper received SIGTERM signal, will terminate gracefully
//! ERROR keepervisor: No new blocks received for 300s, the keeper will terminate
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber backed by `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn block(e: &Event) -> (u64, &str) {
    (e.block.unwrap_or_default(), e.hash.as_deref().unwrap_or("?"))
}

fn reason(e: &Event) -> &str {
    e.reason.as_deref().unwrap_or("unknown")
}

fn task(e: &Event) -> &str {
    e.task.as_deref().unwrap_or("unknown")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::SubscriberPanicked => {
                warn!("Subscriber {} panicked: {}", task(e), reason(e));
            }
            EventKind::SubscriberOverflow => {
                warn!("Subscriber {} dropped an event: {}", task(e), reason(e));
            }
            EventKind::Connected => info!("Keeper connected to {}", reason(e)),
            EventKind::OperatingAs => info!("Keeper operating as {}", reason(e)),
            EventKind::AccountLocked => {
                error!("Account is not unlocked: {}", reason(e));
                error!("Unlocking the account is necessary for the keeper to operate");
            }
            EventKind::WaitingForPeers => {
                info!("Waiting for the node to have at least one peer...")
            }
            EventKind::WaitingForSync => info!("Waiting for the node to sync..."),
            EventKind::NodeUnavailable => {
                warn!("Node query failed, will retry: {}", reason(e))
            }
            EventKind::KeeperStarted => info!("Keeper started"),
            EventKind::HookFailed => error!("Keeper {} logic failed: {}", task(e), reason(e)),
            EventKind::WatchingBlocks => info!("Watching for new blocks"),
            EventKind::PeriodicScheduled => {
                info!(
                    "Running {} every {}ms",
                    task(e),
                    e.elapsed_ms.unwrap_or_default()
                )
            }
            EventKind::PeriodicFailed => {
                error!("Periodic task {} failed: {}", task(e), reason(e))
            }
            EventKind::BlockProcessing => {
                let (n, h) = block(e);
                debug!("Processing block #{n} ({h})");
            }
            EventKind::BlockProcessed => {
                let (n, h) = block(e);
                debug!("Finished processing block #{n} ({h})");
            }
            EventKind::BlockCallbackFailed => {
                let (n, h) = block(e);
                error!("Processing block #{n} ({h}) failed: {}", reason(e));
            }
            EventKind::BlockIgnoredBusy => {
                let (n, h) = block(e);
                info!("Ignoring block #{n} ({h}), as previous callback is still running");
            }
            EventKind::BlockIgnoredSuperseded => {
                let (n, h) = block(e);
                info!(
                    "Ignoring block #{n} ({h}), as there is already block #{} available",
                    e.max_block.unwrap_or_default()
                );
            }
            EventKind::BlockIgnoredDuplicate => {
                let (n, h) = block(e);
                info!("Ignoring block #{n} ({h}), as it has already been handled");
            }
            EventKind::BlockIgnoredSyncing => {
                let (n, h) = block(e);
                info!("Ignoring block #{n} ({h}), as the node is syncing");
            }
            EventKind::WatcherFailed => {
                error!("Watcher {} stopped delivering blocks: {}", task(e), reason(e))
            }
            EventKind::SignalReceived => {
                warn!(
                    "Keeper received {} signal, will terminate gracefully",
                    reason(e)
                )
            }
            EventKind::SignalRepeated => {
                warn!(
                    "Graceful keeper termination due to {} already in progress",
                    reason(e)
                )
            }
            EventKind::TerminationRequested => {
                warn!("Keeper logic asked for termination, the keeper will terminate")
            }
            EventKind::TerminatingOnSignal => {
                warn!("The keeper is terminating due to a signal received")
            }
            EventKind::WatcherDead => {
                error!(
                    "Watcher {} is dead, the keeper will terminate",
                    task(e)
                )
            }
            EventKind::BlocksStale => {
                error!(
                    "No new blocks received for {}s, the keeper will terminate",
                    e.elapsed_ms.unwrap_or_default() / 1000
                )
            }
            EventKind::ShuttingDown => info!("Shutting down the keeper"),
            EventKind::StoppingWatchers => info!("Waiting for all watchers to terminate..."),
            EventKind::WatcherStopFailed => {
                warn!("Watcher {} did not stop cleanly: {}", task(e), reason(e))
            }
            EventKind::WaitingForCallback => {
                info!("Waiting for outstanding callback to terminate...")
            }
            EventKind::ShutdownHookStarted => info!("Executing keeper shutdown logic..."),
            EventKind::ShutdownHookFinished => info!("Shutdown logic finished"),
            EventKind::Terminated => {
                info!("Keeper terminated (exit code {})", e.code.unwrap_or_default())
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
