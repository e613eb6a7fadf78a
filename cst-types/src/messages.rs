//! Merkle paths and notary API message definitions

use crate::primitives::{hash_pair, Digest, LeafHash};
use crate::proof::SerializedProof;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Merkle path from a leaf to the tree root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// The leaf index in the tree
    pub leaf_index: u64,
    /// Sibling hashes from the leaf level upwards
    pub siblings: Vec<MerkleNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleNode {
    pub hash: Digest,
    /// True if this sibling is on the left of the path
    pub is_left: bool,
}

impl MerklePath {
    /// Compute the Merkle root from the raw leaf value.
    ///
    /// Leaves are hashed before pairing, so the fold starts from `H(leaf)`.
    pub fn compute_root(&self, leaf: &[u8]) -> Digest {
        self.siblings
            .iter()
            .fold(Digest::hash(leaf), |current, sibling| {
                if sibling.is_left {
                    hash_pair(&sibling.hash, &current)
                } else {
                    hash_pair(&current, &sibling.hash)
                }
            })
    }

    pub fn depth(&self) -> usize {
        self.siblings.len()
    }
}

/// `POST /api/stamp` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampRequest {
    /// Content hash to timestamp
    pub hash: LeafHash,
    /// Caller's identifier for the stamped file, used to name the archived proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    /// URLs notified once the proof is committed
    #[serde(default)]
    pub webhooks: Vec<String>,
}

/// Commitment status of a stamped hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Pending,
    Committed,
}

/// `POST /api/stamp` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampResponse {
    pub proof: ProofState,
}

impl StampResponse {
    pub fn pending() -> Self {
        Self {
            proof: ProofState::pending(),
        }
    }
}

/// Proof status, plus the proof itself once committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofState {
    pub status: ProofStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<SerializedProof>,
}

impl ProofState {
    pub fn pending() -> Self {
        Self {
            status: ProofStatus::Pending,
            proof: None,
        }
    }

    pub fn committed(proof: SerializedProof) -> Self {
        Self {
            status: ProofStatus::Committed,
            proof: Some(proof),
        }
    }
}

/// `GET /api/state/{hash}` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateResponse {
    pub file: Option<ArchivalFileState>,
    pub proof: ProofState,
}

/// What the archive knows about a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalFileState {
    pub file: ArchivedFile,
    pub metadata: ArchiveMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedFile {
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub archived_at: DateTime<Utc>,
    pub size: u64,
    /// Hex SHA-256 of the stored bytes
    pub sha256_hash: String,
}

/// `POST /api/commit` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Jobs taken from the queue for this commit
    pub completed: usize,
    pub success: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
}

/// Body POSTed to each webhook once a stamp is committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub hash: LeafHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub proof: SerializedProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_merkle_path_two_leaves() {
        let leaf0 = [1u8; 32];
        let leaf1 = [2u8; 32];
        let root_expected = hash_pair(&Digest::hash(&leaf0), &Digest::hash(&leaf1));

        let path = MerklePath {
            leaf_index: 0,
            siblings: vec![MerkleNode {
                hash: Digest::hash(&leaf1),
                is_left: false,
            }],
        };
        assert_eq!(path.compute_root(&leaf0), root_expected);

        let path = MerklePath {
            leaf_index: 1,
            siblings: vec![MerkleNode {
                hash: Digest::hash(&leaf0),
                is_left: true,
            }],
        };
        assert_eq!(path.compute_root(&leaf1), root_expected);
    }

    #[test]
    fn test_empty_path_hashes_leaf() {
        let path = MerklePath {
            leaf_index: 0,
            siblings: vec![],
        };
        assert_eq!(path.compute_root(b"abc"), Digest::hash(b"abc"));
    }

    #[test]
    fn test_stamp_request_uses_camel_case() {
        let json = format!(
            r#"{{"hash":"{}","fileId":"6a1f","webhooks":["http://localhost/hook"]}}"#,
            "ab".repeat(32)
        );
        let request: StampRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(request.file_id.as_deref(), Some("6a1f"));
        assert_eq!(request.webhooks.len(), 1);

        let minimal: StampRequest =
            serde_json::from_str(&format!(r#"{{"hash":"{}"}}"#, "00".repeat(32))).unwrap();
        assert!(minimal.file_id.is_none());
        assert!(minimal.webhooks.is_empty());
    }

    #[test]
    fn test_pending_response_shape() {
        let json = serde_json::to_value(StampResponse::pending()).unwrap();
        assert_eq!(json, serde_json::json!({ "proof": { "status": "pending" } }));
    }

    proptest! {
        #[test]
        fn prop_stamp_request_rejects_bad_hash(s in "[0-9a-f]{0,63}") {
            let json = format!(r#"{{"hash":"{}"}}"#, s);
            prop_assert!(serde_json::from_str::<StampRequest>(&json).is_err());
        }
    }
}
