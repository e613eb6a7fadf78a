//! Commit errors

use cst_core::{ChainError, ProofError};
use thiserror::Error;

/// Why a commit ended in `Failed`.
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Proof construction failed: {0}")]
    Proof(#[from] ProofError),

    #[error("Root submission failed: {0}")]
    Submission(ChainError),

    #[error("Root submission gave no answer within {0:?}")]
    SubmissionTimeout(std::time::Duration),

    #[error("Chain read failed: {0}")]
    Chain(ChainError),

    #[error("Operation {operation} not confirmed between levels {from_level} and {to_level}")]
    ConfirmationTimeout {
        operation: String,
        from_level: i32,
        to_level: i32,
    },

    #[error("Commit cancelled")]
    Cancelled,

    #[error("Another commit is in flight")]
    CommitInProgress,

    #[error("Proof worker failed: {0}")]
    Worker(String),
}

impl CommitError {
    /// Whether running the same hashes in a later commit can succeed.
    ///
    /// Encoding errors recur on every block of the same protocol; everything
    /// else depends on the block or the node and may clear up.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CommitError::Proof(err) if !err.is_integrity_failure())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let encoding = CommitError::Proof(ProofError::Encoding(cst_types::Error::UnsupportedProtocol(
            "PtXXX".into(),
        )));
        assert!(!encoding.is_retryable());

        let integrity = CommitError::Proof(ProofError::RootHashNotEmbedded {
            operation: "oo".into(),
        });
        assert!(integrity.is_retryable());

        let timeout = CommitError::ConfirmationTimeout {
            operation: "oo".into(),
            from_level: 10,
            to_level: 13,
        };
        assert!(timeout.is_retryable());
        assert!(timeout.to_string().contains("between levels 10 and 13"));
    }
}
