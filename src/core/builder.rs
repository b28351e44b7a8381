use std::sync::Arc;

use tokio::sync::mpsc;

use super::{handle::Shared, supervisor::Lifecycle};
use crate::{core::Config, events::Bus, node::NodeRef, subscribers::Subscribe};

/// Builder for constructing a [`Lifecycle`].
pub struct LifecycleBuilder {
    cfg: Config,
    node: NodeRef,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl LifecycleBuilder {
    /// Creates a new builder with the given configuration and node.
    pub fn new(cfg: Config, node: NodeRef) -> Self {
        Self {
            cfg,
            node,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (startup, blocks, termination, etc.)
    /// through dedicated workers with bounded queues. Pass a
    /// [`LogWriter`](crate::LogWriter) to get the keeper's log output.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the lifecycle.
    ///
    /// Does not need a tokio runtime; subscriber workers are spawned by
    /// [`Lifecycle::run`].
    pub fn build(self) -> Lifecycle {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let shared = Shared::new(self.cfg, self.node, bus, requests);

        Lifecycle::new_internal(shared, requests_rx, self.subscribers)
    }
}
