//! Timestamp proof verification against a chain node

use crate::chain::{BlockId, BlockSource, ChainError};
use cst_types::{Digest, HeaderSummary, TimestampProof};
use std::fmt;
use thiserror::Error;

/// Why a verification failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationReason {
    /// The node does not know the derived block hash
    BlockNotFound,
    /// The node could not be reached
    NodeUnreachable,
    /// The node answered with something unusable
    InvalidResponse,
    /// The node's block timestamp differs from the proof's
    TimestampMismatch,
    /// The proof does not derive a block hash, or does not start at the expected leaf
    InvalidDerivation,
}

impl fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            VerificationReason::BlockNotFound => "block_not_found",
            VerificationReason::NodeUnreachable => "node_unreachable",
            VerificationReason::InvalidResponse => "invalid_response",
            VerificationReason::TimestampMismatch => "timestamp_mismatch",
            VerificationReason::InvalidDerivation => "invalid_derivation",
        };
        f.write_str(code)
    }
}

#[derive(Error, Debug, Clone)]
#[error("Verification failed ({reason}): {detail}")]
pub struct VerificationError {
    pub reason: VerificationReason,
    pub detail: String,
}

impl VerificationError {
    pub fn new(reason: VerificationReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl From<ChainError> for VerificationError {
    fn from(err: ChainError) -> Self {
        let reason = match &err {
            ChainError::NotFound(_) => VerificationReason::BlockNotFound,
            ChainError::Transport(_) => VerificationReason::NodeUnreachable,
            ChainError::Rpc { .. } | ChainError::Decode(_) | ChainError::Submission(_) => {
                VerificationReason::InvalidResponse
            }
        };
        VerificationError::new(reason, err.to_string())
    }
}

/// Check that a proof starts at the given leaf hash.
pub fn verify_leaf(proof: &TimestampProof, leaf: &Digest) -> Result<(), VerificationError> {
    if proof.start() != leaf.as_bytes() {
        return Err(VerificationError::new(
            VerificationReason::InvalidDerivation,
            format!("proof starts at {}, not {}", hex::encode(proof.start()), leaf),
        ));
    }
    Ok(())
}

/// Verify a complete timestamp proof against a node
///
/// This performs the following checks:
/// 1. The derivation is a 32-byte block hash
/// 2. The node knows a block with that hash
/// 3. The node's timestamp for it equals the proof's timestamp
pub async fn verify_proof<S>(proof: &TimestampProof, source: &S) -> Result<HeaderSummary, VerificationError>
where
    S: BlockSource + ?Sized,
{
    let derivation = proof.derivation();
    if derivation.len() != Digest::LEN {
        return Err(VerificationError::new(
            VerificationReason::InvalidDerivation,
            format!("derivation is {} bytes, expected {}", derivation.len(), Digest::LEN),
        ));
    }

    let block_hash = proof.block_hash();
    let header = source.fetch_header(&BlockId::Hash(block_hash.clone())).await?;

    if header.hash != block_hash {
        return Err(VerificationError::new(
            VerificationReason::InvalidResponse,
            format!("asked for block {}, node returned {}", block_hash, header.hash),
        ));
    }

    if header.timestamp != proof.timestamp {
        return Err(VerificationError::new(
            VerificationReason::TimestampMismatch,
            format!("proof says {}, node says {}", proof.timestamp, header.timestamp),
        ));
    }

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use cst_types::{BlockData, Operation, Proof};

    struct FixedHeader(Result<HeaderSummary, ChainError>);

    #[async_trait]
    impl BlockSource for FixedHeader {
        async fn fetch_block(&self, id: &BlockId) -> Result<BlockData, ChainError> {
            Err(ChainError::NotFound(id.to_string()))
        }

        async fn fetch_header(&self, _id: &BlockId) -> Result<HeaderSummary, ChainError> {
            self.0.clone()
        }
    }

    fn proof() -> TimestampProof {
        let ts = Utc.with_ymd_and_hms(2022, 4, 1, 9, 30, 0).unwrap();
        TimestampProof::new(Proof::new(vec![7u8; 32], vec![Operation::Hash2b]), "NetXdQprcVkpaWU", ts)
    }

    fn header_for(proof: &TimestampProof) -> HeaderSummary {
        HeaderSummary {
            hash: proof.block_hash(),
            chain_id: Some(proof.network.clone()),
            protocol: None,
            level: 10,
            timestamp: proof.timestamp,
        }
    }

    #[tokio::test]
    async fn test_verify_matching_timestamp() {
        let proof = proof();
        let node = FixedHeader(Ok(header_for(&proof)));
        let header = verify_proof(&proof, &node).await.unwrap();
        assert_eq!(header.level, 10);
    }

    #[tokio::test]
    async fn test_verify_timestamp_mismatch() {
        let proof = proof();
        let mut header = header_for(&proof);
        header.timestamp = header.timestamp + chrono::Duration::seconds(30);
        let err = verify_proof(&proof, &FixedHeader(Ok(header))).await.unwrap_err();
        assert_eq!(err.reason, VerificationReason::TimestampMismatch);
    }

    #[tokio::test]
    async fn test_verify_reports_chain_errors_by_reason() {
        let proof = proof();
        let cases = [
            (ChainError::NotFound("x".into()), VerificationReason::BlockNotFound),
            (ChainError::Transport("refused".into()), VerificationReason::NodeUnreachable),
            (ChainError::Decode("bad json".into()), VerificationReason::InvalidResponse),
        ];
        for (error, reason) in cases {
            let err = verify_proof(&proof, &FixedHeader(Err(error))).await.unwrap_err();
            assert_eq!(err.reason, reason);
        }
    }

    #[tokio::test]
    async fn test_verify_rejects_non_hash_derivation() {
        let mut proof = proof();
        proof.proof.operations.push(Operation::append(vec![1]));
        let node = FixedHeader(Ok(header_for(&proof)));
        let err = verify_proof(&proof, &node).await.unwrap_err();
        assert_eq!(err.reason, VerificationReason::InvalidDerivation);
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_block() {
        let proof = proof();
        let mut header = header_for(&proof);
        header.hash = "BLockGenesisGenesisGenesisGenesisGenesisf79b5d1CoW2".into();
        let err = verify_proof(&proof, &FixedHeader(Ok(header))).await.unwrap_err();
        assert_eq!(err.reason, VerificationReason::InvalidResponse);
    }

    #[test]
    fn test_verify_leaf() {
        let proof = proof();
        assert!(verify_leaf(&proof, &Digest::new([7u8; 32])).is_ok());
        assert_eq!(
            verify_leaf(&proof, &Digest::new([8u8; 32])).unwrap_err().reason,
            VerificationReason::InvalidDerivation
        );
    }
}
