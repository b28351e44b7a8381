//! # Node collaborator: the opaque source of blocks.
//!
//! The runtime never talks to a chain directly. Everything it needs from the
//! node goes through the [`Node`] trait:
//!
//! | Operation                | Used by                                   |
//! |--------------------------|-------------------------------------------|
//! | `subscribe_new_blocks`   | block watcher (one stream per `on_block`) |
//! | `block`                  | block watcher (hash → number)             |
//! | `block_number`           | block watcher (freshest-only filter)      |
//! | `is_syncing`             | watcher, readiness wait, staleness check  |
//! | `peer_count`             | readiness wait                            |
//! | `sign`                   | startup precondition (account unlocked)   |
//!
//! The block stream ends or yields `Err` when the subscription dies; the
//! runtime does not resubscribe.

mod block;

pub use block::{Block, BlockHash, BlockStream};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NodeError;

/// Shared handle to a node (`Arc<dyn Node>`).
pub type NodeRef = Arc<dyn Node>;

/// # Connection to a block-producing node.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use futures::stream::{self, StreamExt};
/// use keepervisor::{Block, BlockHash, BlockStream, Node, NodeError};
///
/// struct Offline;
///
/// #[async_trait]
/// impl Node for Offline {
///     fn endpoint(&self) -> &str { "memory://offline" }
///     fn account(&self) -> &str { "0x00" }
///     async fn subscribe_new_blocks(&self) -> Result<BlockStream, NodeError> {
///         Ok(stream::empty().boxed())
///     }
///     async fn block(&self, hash: &BlockHash) -> Result<Block, NodeError> {
///         Err(NodeError::NotFound(hash.to_string()))
///     }
///     async fn block_number(&self) -> Result<u64, NodeError> { Ok(0) }
///     async fn is_syncing(&self) -> Result<bool, NodeError> { Ok(false) }
///     async fn peer_count(&self) -> Result<u64, NodeError> { Ok(1) }
///     async fn sign(&self, _account: &str, _message: &[u8]) -> Result<Vec<u8>, NodeError> {
///         Err(NodeError::Rejected("account locked".into()))
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Human-readable endpoint (for logs).
    fn endpoint(&self) -> &str;

    /// Account the keeper operates as.
    fn account(&self) -> &str;

    /// Subscribes to hashes of new blocks, newest first as the node sees them.
    async fn subscribe_new_blocks(&self) -> Result<BlockStream, NodeError>;

    /// Fetches a block by hash.
    async fn block(&self, hash: &BlockHash) -> Result<Block, NodeError>;

    /// Highest block number known to the node.
    async fn block_number(&self) -> Result<u64, NodeError>;

    /// True while the node is (re)synchronizing with the network.
    async fn is_syncing(&self) -> Result<bool, NodeError>;

    /// Number of peers the node is connected to.
    async fn peer_count(&self) -> Result<u64, NodeError>;

    /// Signs `message` as `account`; fails if the account is locked.
    async fn sign(&self, account: &str, message: &[u8]) -> Result<Vec<u8>, NodeError>;
}
