//! # Global runtime configuration.
//!
//! Provides [`Config`], centralized timing settings for the lifecycle runtime.
//!
//! ## Sentinel values
//! - `readiness_timeout = 0s` → wait for peers/sync forever
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Global configuration for the lifecycle runtime.
///
/// Defines:
/// - **Supervision cadence**: how often the loop checks termination and health
/// - **Staleness**: how long without a new block counts as a silent stall
/// - **Startup readiness**: polling interval and optional bound for peer/sync waits
/// - **Periodic warm-up**: delay before the first firing of every periodic task
/// - **Event system**: bus capacity for event delivery
/// - **Signals**: whether SIGINT/SIGTERM are handled by the runtime
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Interval between two passes of the supervisory loop.
    ///
    /// Termination requests take effect at the next tick boundary.
    pub tick: Duration,

    /// Maximum age of the last received block before the keeper is considered stalled.
    ///
    /// Ignored while the node reports it is syncing.
    pub stale_after: Duration,

    /// Polling interval for peer-count and sync-status checks during startup.
    pub readiness_poll: Duration,

    /// Upper bound on the startup readiness wait.
    ///
    /// - `Duration::ZERO` = wait forever
    /// - `> 0` = fail with `KeeperError::NodeNotReady` once exceeded
    pub readiness_timeout: Duration,

    /// Delay before the first firing of a periodic task.
    ///
    /// Later firings use the task's own interval.
    pub periodic_warmup: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,

    /// Install SIGINT/SIGTERM (Ctrl-C on Windows) listeners while running.
    pub handle_signals: bool,
}

impl Config {
    /// Returns the startup readiness bound as an `Option`.
    ///
    /// - `None` → wait forever
    /// - `Some(d)` → give up after `d`
    #[inline]
    pub fn readiness_deadline(&self) -> Option<Duration> {
        if self.readiness_timeout == Duration::ZERO {
            None
        } else {
            Some(self.readiness_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `tick = 1s`
    /// - `stale_after = 300s`
    /// - `readiness_poll = 250ms`
    /// - `readiness_timeout = 0s` (wait forever)
    /// - `periodic_warmup = 1s`
    /// - `bus_capacity = 1024`
    /// - `handle_signals = true`
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            stale_after: Duration::from_secs(300),
            readiness_poll: Duration::from_millis(250),
            readiness_timeout: Duration::ZERO,
            periodic_warmup: Duration::from_secs(1),
            bus_capacity: 1024,
            handle_signals: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        let mut cfg = Config::default();
        assert_eq!(cfg.readiness_deadline(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1024);

        cfg.readiness_timeout = Duration::from_secs(30);
        cfg.bus_capacity = 0;
        assert_eq!(cfg.readiness_deadline(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
