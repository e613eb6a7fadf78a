//! Seams to the chain: reading blocks and submitting batch roots

use async_trait::async_trait;
use cst_types::{BlockData, Digest, HeaderSummary};
use std::fmt;
use thiserror::Error;

/// How a block is addressed on the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockId {
    Head,
    Level(i32),
    Hash(String),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Head => f.write_str("head"),
            BlockId::Level(level) => write!(f, "{}", level),
            BlockId::Hash(hash) => f.write_str(hash),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("Block not found: {0}")]
    NotFound(String),

    #[error("Node returned {status}: {message}")]
    Rpc { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode node response: {0}")]
    Decode(String),

    #[error("Submission failed: {0}")]
    Submission(String),
}

impl ChainError {
    /// "Not there yet" while polling, as opposed to a failing node.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::NotFound(_))
    }
}

/// Read access to blocks.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch_block(&self, id: &BlockId) -> Result<BlockData, ChainError>;

    async fn fetch_header(&self, id: &BlockId) -> Result<HeaderSummary, ChainError>;
}

/// Injects a batch root into the commitment contract.
#[async_trait]
pub trait RootCommitter: Send + Sync {
    /// Submit the root and return the Base58 operation hash.
    async fn submit(&self, root: &Digest) -> Result<String, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_id_path_segment() {
        assert_eq!(BlockId::Head.to_string(), "head");
        assert_eq!(BlockId::Level(1_932_445).to_string(), "1932445");
        assert_eq!(BlockId::Hash("BLabc".into()).to_string(), "BLabc");
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(ChainError::NotFound("head~1".into()).is_not_found());
        assert!(!ChainError::Transport("connection refused".into()).is_not_found());
    }
}
