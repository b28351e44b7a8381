use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;

use crate::error::NodeError;

/// Stream of new block hashes; ends or yields `Err` when the subscription dies.
pub type BlockStream = BoxStream<'static, Result<BlockHash, NodeError>>;

/// Opaque block identifier as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockHash(Arc<str>);

impl BlockHash {
    /// Creates a hash from its textual form.
    pub fn new(hash: impl Into<Arc<str>>) -> Self {
        Self(hash.into())
    }

    /// Textual form of the hash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BlockHash {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<BlockHash> for Arc<str> {
    fn from(h: BlockHash) -> Self {
        h.0
    }
}

/// A block resolved from its hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Height of the block.
    pub number: u64,
    /// Hash of the block.
    pub hash: BlockHash,
}

impl Block {
    /// Creates a block.
    pub fn new(number: u64, hash: impl Into<BlockHash>) -> Self {
        Self {
            number,
            hash: hash.into(),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_display_matches_log_format() {
        let block = Block::new(42, "0x2a");
        assert_eq!(block.to_string(), "#42 (0x2a)");
        assert_eq!(block.hash.as_str(), "0x2a");
    }
}
