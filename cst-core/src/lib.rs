//! Proof construction engine for CST (Chain Stamp Trees)
//!
//! This crate provides:
//! - Merkle tree construction with the chain's list-hashing rule
//! - Canonical operation and block header encodings
//! - The four proof segments linking a leaf to a block hash
//! - Timestamp proof verification against a chain node

pub mod chain;
pub mod error;
pub mod forge;
pub mod generator;
pub mod header;
pub mod merkle;
pub mod verify;

#[cfg(feature = "test-util")]
pub mod testutil;

pub use chain::{BlockId, BlockSource, ChainError, RootCommitter};
pub use error::{ProofError, Result};
pub use generator::{inclusion_proof, leaf_proofs, path_to_proof, ProofGenerator};
pub use header::HeaderEra;
pub use merkle::{MerkleTree, MerkleTreeBuilder};
pub use verify::{verify_leaf, verify_proof, VerificationError, VerificationReason};
