//! Error types used by the keepervisor runtime, its node collaborator and user callbacks.
//!
//! - [`KeeperError`] errors raised by the lifecycle runtime itself.
//! - [`NodeError`] errors reported by a [`Node`](crate::Node) implementation.
//! - [`CallbackError`] errors raised by user callbacks and hooks.
//! - [`WatchError`] errors raised while stopping a watcher.
//! - [`RegistrationError`] rejected `on_block` / `every` registrations.
//!
//! Every enum provides `as_label` (stable snake_case label for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the keepervisor runtime.
///
/// Runtime errors abort [`Lifecycle::run`](crate::Lifecycle::run) before the
/// supervisory loop is reached. Everything that happens once the loop runs is
/// reported through the final [`Outcome`](crate::Outcome) instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum KeeperError {
    /// The node did not become ready (peers + sync) within the configured timeout.
    #[error("node not ready after {waited:?}")]
    NodeNotReady {
        /// How long the runtime waited.
        waited: Duration,
    },

    /// OS signal listeners could not be installed.
    #[error("failed to install signal handlers: {0}")]
    SignalRegistration(#[from] std::io::Error),
}

impl KeeperError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use keepervisor::KeeperError;
    /// use std::time::Duration;
    ///
    /// let err = KeeperError::NodeNotReady { waited: Duration::from_secs(5) };
    /// assert_eq!(err.as_label(), "keeper_node_not_ready");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            KeeperError::NodeNotReady { .. } => "keeper_node_not_ready",
            KeeperError::SignalRegistration(_) => "keeper_signal_registration",
        }
    }
}

/// # Errors reported by the node collaborator.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The connection to the node failed (HTTP/IPC/WebSocket error).
    #[error("transport error: {0}")]
    Transport(String),

    /// The requested item does not exist on the node.
    #[error("not found: {0}")]
    NotFound(String),

    /// The node refused the request (e.g. locked account on `sign`).
    #[error("rejected by node: {0}")]
    Rejected(String),

    /// The new-block subscription ended.
    #[error("block stream closed")]
    StreamClosed,
}

impl NodeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeError::Transport(_) => "node_transport",
            NodeError::NotFound(_) => "node_not_found",
            NodeError::Rejected(_) => "node_rejected",
            NodeError::StreamClosed => "node_stream_closed",
        }
    }
}

/// # Errors produced by user callbacks and hooks.
///
/// Callback errors never crash the runtime: they are caught at the boundary
/// where they occur and turned into events.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum CallbackError {
    /// Callback returned an error.
    #[error("callback failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Callback panicked; the panic was caught.
    #[error("callback panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl CallbackError {
    /// Builds a [`CallbackError::Fail`] from anything printable.
    ///
    /// # Example
    /// ```
    /// use keepervisor::CallbackError;
    ///
    /// let err = CallbackError::fail("insufficient balance");
    /// assert_eq!(err.as_label(), "callback_failed");
    /// assert_eq!(err.to_string(), "callback failed: insufficient balance");
    /// ```
    pub fn fail(error: impl std::fmt::Display) -> Self {
        CallbackError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CallbackError::Fail { .. } => "callback_failed",
            CallbackError::Panicked { .. } => "callback_panicked",
        }
    }

    /// Wraps a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        CallbackError::Panicked {
            info: panic_message(payload.as_ref()),
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl From<NodeError> for CallbackError {
    fn from(err: NodeError) -> Self {
        CallbackError::fail(err)
    }
}

impl From<RegistrationError> for CallbackError {
    fn from(err: RegistrationError) -> Self {
        CallbackError::fail(err)
    }
}

/// # Errors produced while stopping a watcher.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The watcher task panicked; it was stopped nonetheless.
    #[error("watcher '{name}' panicked")]
    Panicked {
        /// Watcher name.
        name: String,
    },
}

impl WatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WatchError::Panicked { .. } => "watch_panicked",
        }
    }
}

/// # Rejected registrations.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// A block callback is already registered on this lifecycle.
    #[error("block callback already registered")]
    BlockCallbackExists,

    /// `every` was called with a zero interval.
    #[error("periodic interval must be greater than zero")]
    ZeroInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads_are_rendered() {
        let err = CallbackError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "callback panicked: boom");

        let err = CallbackError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.as_label(), "callback_panicked");
        assert_eq!(err.to_string(), "callback panicked: owned boom");

        let err = CallbackError::from_panic(Box::new(42u32));
        assert_eq!(err.to_string(), "callback panicked: non-string panic payload");
    }

    #[test]
    fn test_node_error_converts_to_callback_failure() {
        let err: CallbackError = NodeError::Transport("connection reset".into()).into();
        assert_eq!(err.as_label(), "callback_failed");
        assert_eq!(
            err.to_string(),
            "callback failed: transport error: connection reset"
        );
    }
}
