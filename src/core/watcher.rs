//! # Block watcher: turns the new-block stream into callback invocations.
//!
//! ```text
//! node.subscribe_new_blocks() ──► hash ──► touch last_block_at
//!                                           │
//!                                           ▼
//!                                  node.block(hash) ──► node.is_syncing()
//!                                                          │ yes ──► BlockIgnoredSyncing
//!                                                          ▼ no
//!                                                  node.block_number() = max
//!                                                          │ number < max  ──► BlockIgnoredSuperseded
//!                                                          │ hash == last  ──► BlockIgnoredDuplicate
//!                                                          ▼
//!                                          AsyncCallback::trigger(block)
//!                                             ├─ accepted ──► BlockProcessing … BlockProcessed | BlockCallbackFailed
//!                                             └─ busy     ──► BlockIgnoredBusy
//! ```
//!
//! ## Rules
//! - Only the freshest block is ever handed to the callback.
//! - A re-announced hash is handed over once; a new hash at the same height
//!   (a reorg) is a new head and is handed over again.
//! - A busy callback means the block is dropped, never queued.
//! - Stream errors, the end of the stream and node errors end the watcher; the
//!   registry then reports it dead and the lifecycle goes fatal.

use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::callbacks::AsyncCallback;
use crate::core::state::LifecycleState;
use crate::error::{CallbackError, NodeError};
use crate::events::{Bus, Event, EventKind};
use crate::node::{Block, BlockHash, BlockStream, NodeRef};

/// Name under which the block watcher is registered.
pub(crate) const BLOCK_WATCHER: &str = "new-blocks";

pub(crate) struct BlockWatcher {
    node: NodeRef,
    bus: Bus,
    state: Arc<LifecycleState>,
    callback: Arc<AsyncCallback<Block>>,
    last_accepted: Mutex<Option<BlockHash>>,
}

impl BlockWatcher {
    pub fn new(
        node: NodeRef,
        bus: Bus,
        state: Arc<LifecycleState>,
        callback: Arc<AsyncCallback<Block>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            bus,
            state,
            callback,
            last_accepted: Mutex::new(None),
        })
    }

    /// Subscribes to new blocks, then runs until the stream dies or `token` is cancelled.
    pub async fn watch(self: Arc<Self>, token: CancellationToken) {
        let subscribed = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            res = self.node.subscribe_new_blocks() => res,
        };
        match subscribed {
            Ok(stream) => self.run(stream, token).await,
            Err(e) => self.fail(e),
        }
    }

    /// Consumes `stream` until it dies or `token` is cancelled.
    pub async fn run(self: Arc<Self>, mut stream: BlockStream, token: CancellationToken) {
        loop {
            let step = async {
                match stream.next().await {
                    Some(Ok(hash)) => self.on_new_block(hash).await,
                    Some(Err(e)) => Err(e),
                    None => Err(NodeError::StreamClosed),
                }
            };

            let res = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                res = step => res,
            };

            if let Err(e) = res {
                self.fail(e);
                return;
            }
        }
    }

    /// Handles one announced hash.
    pub async fn on_new_block(&self, hash: BlockHash) -> Result<(), NodeError> {
        self.state.touch_block();

        let block = self.node.block(&hash).await?;
        if self.node.is_syncing().await? {
            self.publish(EventKind::BlockIgnoredSyncing, &block);
            return Ok(());
        }

        let max = self.node.block_number().await?;
        if block.number < max {
            self.bus.publish(
                Event::new(EventKind::BlockIgnoredSuperseded)
                    .with_block(block.number, block.hash.clone())
                    .with_max_block(max),
            );
            return Ok(());
        }

        {
            let mut last = self
                .last_accepted
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.as_ref() == Some(&block.hash) {
                drop(last);
                self.publish(EventKind::BlockIgnoredDuplicate, &block);
                return Ok(());
            }
            *last = Some(block.hash.clone());
        }

        let started = {
            let bus = self.bus.clone();
            let block = block.clone();
            move || {
                bus.publish(
                    Event::new(EventKind::BlockProcessing).with_block(block.number, block.hash),
                )
            }
        };
        let finished = {
            let bus = self.bus.clone();
            let block = block.clone();
            move |res: &Result<(), CallbackError>| {
                let ev = match res {
                    Ok(()) => Event::new(EventKind::BlockProcessed),
                    Err(e) => Event::new(EventKind::BlockCallbackFailed).with_reason(e.to_string()),
                };
                bus.publish(ev.with_block(block.number, block.hash));
            }
        };

        if !self.callback.trigger(block.clone(), started, finished) {
            self.publish(EventKind::BlockIgnoredBusy, &block);
        }
        Ok(())
    }

    fn fail(&self, e: NodeError) {
        self.bus.publish(
            Event::new(EventKind::WatcherFailed)
                .with_task(BLOCK_WATCHER)
                .with_reason(e.to_string()),
        );
    }

    fn publish(&self, kind: EventKind, block: &Block) {
        self.bus
            .publish(Event::new(kind).with_block(block.number, block.hash.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{CallbackFn, CallbackRef};
    use crate::core::registry::{Watch, WatchHandle};
    use crate::node::Node;
    use crate::test_support::FakeNode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Notify, broadcast};

    struct Harness {
        node: Arc<FakeNode>,
        state: Arc<LifecycleState>,
        callback: Arc<AsyncCallback<Block>>,
        watcher: Arc<BlockWatcher>,
        rx: broadcast::Receiver<Event>,
        seen: Arc<Mutex<Vec<u64>>>,
    }

    fn harness(gate: Option<Arc<Notify>>) -> Harness {
        let node = FakeNode::new();
        let bus = Bus::new(64);
        let rx = bus.subscribe();
        let state = Arc::new(LifecycleState::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        let cb: CallbackRef<Block> = CallbackFn::arc(move |block: Block| {
            let s = s.clone();
            let gate = gate.clone();
            async move {
                s.lock().unwrap().push(block.number);
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                Ok(())
            }
        });
        let callback = Arc::new(AsyncCallback::new(cb));
        let watcher = BlockWatcher::new(node.clone(), bus, state.clone(), callback.clone());

        Harness {
            node,
            state,
            callback,
            watcher,
            rx,
            seen,
        }
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<(EventKind, u64)> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push((ev.kind, ev.block.unwrap_or_default()));
        }
        out
    }

    #[tokio::test]
    async fn test_only_fresh_unseen_blocks_reach_the_callback() {
        let mut h = harness(None);

        let b5 = h.node.add_block(5);
        h.node.set_height(5);
        h.watcher.on_new_block(b5.clone()).await.unwrap();
        h.callback.wait().await;

        h.watcher.on_new_block(b5).await.unwrap();

        let b6 = h.node.add_block(6);
        h.node.set_height(6);
        h.watcher.on_new_block(b6).await.unwrap();
        h.callback.wait().await;

        let b4 = h.node.add_block(4);
        h.watcher.on_new_block(b4).await.unwrap();

        assert_eq!(*h.seen.lock().unwrap(), vec![5, 6]);
        assert_eq!(
            drain(&mut h.rx),
            vec![
                (EventKind::BlockProcessing, 5),
                (EventKind::BlockProcessed, 5),
                (EventKind::BlockIgnoredDuplicate, 5),
                (EventKind::BlockProcessing, 6),
                (EventKind::BlockProcessed, 6),
                (EventKind::BlockIgnoredSuperseded, 4),
            ]
        );
        assert!(h.state.last_block_at().is_some());
    }

    #[tokio::test]
    async fn test_reorged_head_reaches_the_callback() {
        let mut h = harness(None);

        let b6 = h.node.add_block(6);
        h.node.set_height(6);
        h.watcher.on_new_block(b6).await.unwrap();
        h.callback.wait().await;

        let fork6 = h.node.add_fork(6, "reorg");
        h.watcher.on_new_block(fork6).await.unwrap();
        h.callback.wait().await;

        // Chain rolled back below the accepted height.
        let fork5 = h.node.add_fork(5, "reorg");
        h.node.set_height(5);
        h.watcher.on_new_block(fork5.clone()).await.unwrap();
        h.callback.wait().await;

        h.watcher.on_new_block(fork5).await.unwrap();

        assert_eq!(*h.seen.lock().unwrap(), vec![6, 6, 5]);
        assert_eq!(
            drain(&mut h.rx),
            vec![
                (EventKind::BlockProcessing, 6),
                (EventKind::BlockProcessed, 6),
                (EventKind::BlockProcessing, 6),
                (EventKind::BlockProcessed, 6),
                (EventKind::BlockProcessing, 5),
                (EventKind::BlockProcessed, 5),
                (EventKind::BlockIgnoredDuplicate, 5),
            ]
        );
    }

    #[tokio::test]
    async fn test_block_is_dropped_while_callback_runs() {
        let gate = Arc::new(Notify::new());
        let mut h = harness(Some(gate.clone()));

        let b1 = h.node.add_block(1);
        h.node.set_height(1);
        h.watcher.on_new_block(b1).await.unwrap();

        let b2 = h.node.add_block(2);
        h.node.set_height(2);
        h.watcher.on_new_block(b2).await.unwrap();

        gate.notify_one();
        h.callback.wait().await;

        assert_eq!(*h.seen.lock().unwrap(), vec![1]);
        assert_eq!(
            drain(&mut h.rx),
            vec![
                (EventKind::BlockProcessing, 1),
                (EventKind::BlockIgnoredBusy, 2),
                (EventKind::BlockProcessed, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_syncing_node_blocks_are_ignored() {
        let mut h = harness(None);
        h.node.set_syncing(true);

        let b1 = h.node.add_block(1);
        h.node.set_height(1);
        h.watcher.on_new_block(b1).await.unwrap();

        assert!(h.seen.lock().unwrap().is_empty());
        assert!(!h.callback.is_running());
        assert_eq!(drain(&mut h.rx), vec![(EventKind::BlockIgnoredSyncing, 1)]);
        assert!(h.state.last_block_at().is_some());
    }

    #[tokio::test]
    async fn test_failing_callback_is_reported_and_next_block_runs() {
        let node = FakeNode::new();
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let cb: CallbackRef<Block> = CallbackFn::arc(move |_: Block| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(CallbackError::fail("out of gas"))
                } else {
                    Ok(())
                }
            }
        });
        let callback = Arc::new(AsyncCallback::new(cb));
        let watcher = BlockWatcher::new(
            node.clone(),
            bus,
            Arc::new(LifecycleState::default()),
            callback.clone(),
        );

        for n in [1, 2] {
            let hash = node.add_block(n);
            node.set_height(n);
            watcher.on_new_block(hash).await.unwrap();
            callback.wait().await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                (EventKind::BlockProcessing, 1),
                (EventKind::BlockCallbackFailed, 1),
                (EventKind::BlockProcessing, 2),
                (EventKind::BlockProcessed, 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_hash_is_a_node_error() {
        let h = harness(None);
        let err = h
            .watcher
            .on_new_block(BlockHash::from("0xdead"))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "node_not_found");
    }

    #[tokio::test]
    async fn test_broken_stream_kills_the_watch() {
        let mut h = harness(None);
        let stream = h.node.subscribe_new_blocks().await.unwrap();
        let token = CancellationToken::new();
        let handle = WatchHandle::spawn(
            BLOCK_WATCHER,
            token.clone(),
            h.watcher.clone().run(stream, token),
        );

        h.node.mine(1);
        h.node.break_streams(NodeError::Transport("socket closed".into()));

        let ev = loop {
            let ev = h.rx.recv().await.unwrap();
            if ev.kind == EventKind::WatcherFailed {
                break ev;
            }
        };
        assert_eq!(ev.task.as_deref(), Some(BLOCK_WATCHER));
        assert_eq!(ev.reason.as_deref(), Some("transport error: socket closed"));

        while handle.is_alive() {
            tokio::task::yield_now().await;
        }
        h.callback.wait().await;
        assert_eq!(*h.seen.lock().unwrap(), vec![1]);
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_stream_kills_the_watch() {
        let mut h = harness(None);
        let stream = h.node.subscribe_new_blocks().await.unwrap();
        let token = CancellationToken::new();
        let handle = WatchHandle::spawn(
            BLOCK_WATCHER,
            token.clone(),
            h.watcher.clone().run(stream, token),
        );

        h.node.close_streams();
        let ev = h.rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::WatcherFailed);
        assert_eq!(ev.reason.as_deref(), Some("block stream closed"));

        while handle.is_alive() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_stopped_watcher_exits_quietly() {
        let mut h = harness(None);
        let stream = h.node.subscribe_new_blocks().await.unwrap();
        let token = CancellationToken::new();
        let handle = WatchHandle::spawn(
            BLOCK_WATCHER,
            token.clone(),
            h.watcher.clone().run(stream, token),
        );
        assert!(handle.is_alive());

        handle.stop().await.unwrap();
        assert!(!handle.is_alive());
        assert!(h.rx.try_recv().is_err());
    }
}
