//! Test doubles shared by the unit tests: a scriptable [`FakeNode`] and a
//! [`Recorder`] subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;

use crate::error::NodeError;
use crate::events::{Event, EventKind};
use crate::node::{Block, BlockHash, BlockStream, Node};
use crate::subscribers::Subscribe;

/// In-memory node. Defaults: one peer, not syncing, height 0, unlocked account.
pub(crate) struct FakeNode {
    peers: AtomicU64,
    syncing: AtomicBool,
    syncing_fails: AtomicBool,
    height: AtomicU64,
    sign_fails: AtomicBool,
    peer_queries: AtomicUsize,
    blocks: Mutex<HashMap<BlockHash, Block>>,
    streams: Mutex<Vec<mpsc::UnboundedSender<Result<BlockHash, NodeError>>>>,
}

impl FakeNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: AtomicU64::new(1),
            syncing: AtomicBool::new(false),
            syncing_fails: AtomicBool::new(false),
            height: AtomicU64::new(0),
            sign_fails: AtomicBool::new(false),
            peer_queries: AtomicUsize::new(0),
            blocks: Mutex::new(HashMap::new()),
            streams: Mutex::new(Vec::new()),
        })
    }

    pub fn set_peers(&self, peers: u64) {
        self.peers.store(peers, Ordering::SeqCst);
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::SeqCst);
    }

    pub fn set_syncing_fails(&self, fails: bool) {
        self.syncing_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn lock_account(&self) {
        self.sign_fails.store(true, Ordering::SeqCst);
    }

    pub fn peer_queries(&self) -> usize {
        self.peer_queries.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    /// Makes block `number` resolvable and returns its hash.
    pub fn add_block(&self, number: u64) -> BlockHash {
        let hash = BlockHash::new(format!("0x{number:x}"));
        self.blocks
            .lock()
            .unwrap()
            .insert(hash.clone(), Block::new(number, hash.clone()));
        hash
    }

    /// Registers a competing block at `number` with a distinct hash.
    pub fn add_fork(&self, number: u64, tag: &str) -> BlockHash {
        let hash = BlockHash::new(format!("0x{tag}{number:x}"));
        self.blocks
            .lock()
            .unwrap()
            .insert(hash.clone(), Block::new(number, hash.clone()));
        hash
    }

    /// Announces `hash` on every open subscription.
    pub fn announce(&self, hash: BlockHash) {
        for tx in self.streams.lock().unwrap().iter() {
            let _ = tx.unbounded_send(Ok(hash.clone()));
        }
    }

    /// Mines block `number`: resolvable, raises the height, announced.
    pub fn mine(&self, number: u64) {
        let hash = self.add_block(number);
        self.height.fetch_max(number, Ordering::SeqCst);
        self.announce(hash);
    }

    /// Pushes an error into every open subscription.
    pub fn break_streams(&self, err: NodeError) {
        for tx in self.streams.lock().unwrap().iter() {
            let _ = tx.unbounded_send(Err(err.clone()));
        }
    }

    /// Ends every open subscription.
    pub fn close_streams(&self) {
        for tx in self.streams.lock().unwrap().iter() {
            tx.close_channel();
        }
    }
}

#[async_trait]
impl Node for FakeNode {
    fn endpoint(&self) -> &str {
        "memory://fake"
    }

    fn account(&self) -> &str {
        "0xkeeper"
    }

    async fn subscribe_new_blocks(&self) -> Result<BlockStream, NodeError> {
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().unwrap().push(tx);
        Ok(rx.boxed())
    }

    async fn block(&self, hash: &BlockHash) -> Result<Block, NodeError> {
        self.blocks
            .lock()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(hash.to_string()))
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn is_syncing(&self) -> Result<bool, NodeError> {
        if self.syncing_fails.load(Ordering::SeqCst) {
            return Err(NodeError::Transport("connection refused".into()));
        }
        Ok(self.syncing.load(Ordering::SeqCst))
    }

    async fn peer_count(&self) -> Result<u64, NodeError> {
        self.peer_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.peers.load(Ordering::SeqCst))
    }

    async fn sign(&self, _account: &str, message: &[u8]) -> Result<Vec<u8>, NodeError> {
        if self.sign_fails.load(Ordering::SeqCst) {
            return Err(NodeError::Rejected("authentication needed: password or unlock".into()));
        }
        Ok(message.to_vec())
    }
}

/// Subscriber that keeps every event it sees.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    /// Kinds of the events describing single blocks, as `(kind, number)`.
    pub fn block_events(&self) -> Vec<(EventKind, u64)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_block_event())
            .map(|e| (e.kind, e.block.unwrap_or_default()))
            .collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Position of the first event of `kind`.
    pub fn position(&self, kind: EventKind) -> Option<usize> {
        self.kinds().iter().position(|k| *k == kind)
    }
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}
