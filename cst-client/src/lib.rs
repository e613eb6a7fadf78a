//! CST Client Library
//!
//! Talks to notary servers and chain nodes, keeps a local proof store and
//! verifies timestamp proofs against a live node.

pub mod client;
pub mod rpc;
pub mod storage;

pub use client::{leaf_hash, load_timestamp_proof, timestamp_proof, HealthStatus, NotaryClient, RetryConfig};
pub use rpc::RpcChainClient;
pub use storage::ProofStorage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Notary returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Verification failed: {0}")]
    VerificationFailed(#[from] cst_core::VerificationError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Timeout")]
    Timeout,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
