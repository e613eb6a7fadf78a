//! Core types and encodings for CST (Chain Stamp Trees)
//!
//! This crate defines the data structures shared by the proof engine, the
//! notary and the client: digests, the chain's binary codecs, the block data
//! model, the proof algebra and the notary's API messages.

pub mod block;
pub mod codec;
pub mod error;
pub mod messages;
pub mod primitives;
pub mod proof;

pub use block::{BlockData, BlockHeader, HeaderSummary, OperationContent, OperationEntry, ToggleVote};
pub use error::{Error, Result};
pub use messages::{
    ArchivalFileState, CommitSummary, MerkleNode, MerklePath, ProofState, ProofStatus,
    StampRequest, StampResponse, StateResponse, WebhookPayload,
};
pub use primitives::{blake2b_256, hash_pair, Digest, LeafHash};
pub use proof::{AnyProof, Operation, Proof, SerializedProof, TimestampProof, PROOF_VERSION};
