//! CST Notary Server
//!
//! Batches content hashes into a Merkle tree, commits the root to the chain
//! through a wallet, and once the commitment is confirmed issues one
//! timestamp proof per hash.

pub mod api;
pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod server;
pub mod service;
pub mod wallet;
pub mod webhook;

#[cfg(feature = "test-util")]
pub mod testutil;

pub use archive::{Archive, SledArchive, StorageRef};
pub use batch::{BatchStatus, CommitBatch};
pub use config::NotaryConfig;
pub use error::CommitError;
pub use orchestrator::{CommitReport, CommitState, Commitment, StampingOrchestrator};
pub use queue::{JobOutcome, JobState, StampJob, StampQueue};
pub use server::NotaryServer;
pub use service::{NotaryService, ServiceError};
pub use wallet::OctezClientCommitter;
pub use webhook::WebhookDispatcher;
