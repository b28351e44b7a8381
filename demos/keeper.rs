//! # Example: Keeper against a simulated node
//!
//! A node that mines a block every 2s drives a keeper with:
//! - a block callback that is sometimes slower than the block time (busy drops),
//! - a periodic task,
//! - startup/shutdown hooks,
//! - an internal termination request after block #8 (Ctrl-C works too).
//!
//! Run with: `RUST_LOG=debug cargo run --example keeper`

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use tracing_subscriber::EnvFilter;

use keepervisor::{
    Block, BlockHash, BlockStream, CallbackError, CallbackFn, Config, Lifecycle, LifecycleHandle,
    LogWriter, Node, NodeError, Subscribe,
};

/// In-process chain producing one block every `block_time`.
struct SimulatedNode {
    height: AtomicU64,
    blocks: Mutex<HashMap<BlockHash, Block>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Result<BlockHash, NodeError>>>>,
}

impl SimulatedNode {
    fn start(block_time: Duration) -> Arc<Self> {
        let node = Arc::new(Self {
            height: AtomicU64::new(0),
            blocks: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
        });

        let miner = Arc::clone(&node);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_time);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                miner.mine();
            }
        });
        node
    }

    fn mine(&self) {
        let number = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        let hash = BlockHash::new(format!("0x{:064x}", number * 7919));
        if let Ok(mut blocks) = self.blocks.lock() {
            blocks.insert(hash.clone(), Block::new(number, hash.clone()));
        }
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.unbounded_send(Ok(hash.clone())).is_ok());
        }
    }
}

#[async_trait]
impl Node for SimulatedNode {
    fn endpoint(&self) -> &str {
        "memory://simulated"
    }

    fn account(&self) -> &str {
        "0x00a329c0648769a73afac7f9381e08fb43dbea72"
    }

    async fn subscribe_new_blocks(&self) -> Result<BlockStream, NodeError> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers
            .lock()
            .map_err(|_| NodeError::Transport("node state poisoned".into()))?
            .push(tx);
        Ok(rx.boxed())
    }

    async fn block(&self, hash: &BlockHash) -> Result<Block, NodeError> {
        self.blocks
            .lock()
            .map_err(|_| NodeError::Transport("node state poisoned".into()))?
            .get(hash)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(hash.to_string()))
    }

    async fn block_number(&self) -> Result<u64, NodeError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn is_syncing(&self) -> Result<bool, NodeError> {
        Ok(false)
    }

    async fn peer_count(&self) -> Result<u64, NodeError> {
        Ok(4)
    }

    async fn sign(&self, _account: &str, message: &[u8]) -> Result<Vec<u8>, NodeError> {
        Ok(message.iter().rev().copied().collect())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let node = SimulatedNode::start(Duration::from_secs(2));

    let cfg = Config {
        stale_after: Duration::from_secs(30),
        ..Config::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mut lifecycle = Lifecycle::builder(cfg, node).with_subscribers(subs).build();
    let handle = lifecycle.handle();

    lifecycle.on_startup(CallbackFn::arc(|lifecycle: LifecycleHandle| async move {
        let height = lifecycle.node().block_number().await?;
        println!("[startup] node at block #{height}");

        lifecycle.every(
            Duration::from_secs(5),
            CallbackFn::arc(|_: ()| async {
                println!("[every] checking balances");
                Ok(())
            }),
        )?;
        Ok::<(), CallbackError>(())
    }));

    lifecycle
        .on_block(CallbackFn::arc(move |block: Block| {
            let handle = handle.clone();
            async move {
                // Every third block takes longer than the block time.
                let work = if block.number % 3 == 0 { 3 } else { 1 };
                tokio::time::sleep(Duration::from_secs(work)).await;

                if block.number >= 8 {
                    handle.terminate();
                }
                Ok(())
            }
        }))
        .await?;

    lifecycle.on_shutdown(CallbackFn::arc(|_: LifecycleHandle| async {
        println!("[shutdown] cancelling pending orders");
        Ok(())
    }));

    let outcome = lifecycle.run().await?;
    println!("keeper finished: {outcome:?} (exit {})", outcome.exit_code());
    Ok(outcome.into())
}
