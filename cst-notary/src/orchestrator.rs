//! Commit state machine
//!
//! A commit digests the pending batch into a Merkle tree, submits its root,
//! waits for the operation to land and be confirmed, then builds one
//! timestamp proof per leaf from the confirmed block.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cst_core::{leaf_proofs, BlockId, BlockSource, MerkleTree, ProofError, ProofGenerator, RootCommitter};
use cst_types::{BlockData, Digest, LeafHash, TimestampProof};

use crate::batch::{BatchStatus, CommitBatch};
use crate::config::CommitConfig;
use crate::error::CommitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    Idle,
    Digesting,
    Submitted,
    AwaitingInclusion,
    AwaitingConfirmations,
    BuildingProofs,
    Done,
    Failed,
}

impl CommitState {
    /// True while a commit holds the in-flight slot.
    pub fn is_active(&self) -> bool {
        !matches!(self, CommitState::Idle | CommitState::Done | CommitState::Failed)
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitState::Idle => "idle",
            CommitState::Digesting => "digesting",
            CommitState::Submitted => "submitted",
            CommitState::AwaitingInclusion => "awaiting_inclusion",
            CommitState::AwaitingConfirmations => "awaiting_confirmations",
            CommitState::BuildingProofs => "building_proofs",
            CommitState::Done => "done",
            CommitState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where a batch root landed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub root: Digest,
    pub operation: String,
    pub level: i32,
    pub block_hash: String,
}

/// Result of one commit. Empty when there was nothing to commit.
#[derive(Debug, Clone, Default)]
pub struct CommitReport {
    pub commitment: Option<Commitment>,
    pub proofs: HashMap<LeafHash, TimestampProof>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn get(&self, leaf: &LeafHash) -> Option<&TimestampProof> {
        self.proofs.get(leaf)
    }
}

/// Owns the commit batch and drives commits through [`CommitState`].
///
/// At most one commit is in flight at a time; a second `commit` call while
/// one is running fails with [`CommitError::CommitInProgress`].
pub struct StampingOrchestrator {
    config: CommitConfig,
    source: Arc<dyn BlockSource>,
    committer: Arc<dyn RootCommitter>,
    batch: Mutex<CommitBatch>,
    in_flight: Mutex<()>,
    state: watch::Sender<CommitState>,
    shutdown: CancellationToken,
}

impl StampingOrchestrator {
    pub fn new(
        config: CommitConfig,
        source: Arc<dyn BlockSource>,
        committer: Arc<dyn RootCommitter>,
    ) -> Self {
        let (state, _) = watch::channel(CommitState::Idle);
        Self {
            config,
            source,
            committer,
            batch: Mutex::new(CommitBatch::new()),
            in_flight: Mutex::new(()),
            state,
            shutdown: CancellationToken::new(),
        }
    }

    /// Share a shutdown token with the rest of the service.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Add a leaf hash to the next commit. Returns false for a duplicate.
    pub async fn stamp(&self, hash: LeafHash) -> bool {
        let added = self.batch.lock().await.add(hash);
        if added {
            debug!(hash = %hash, "Stamp added to batch");
        }
        added
    }

    /// Drop a pending hash from the batch.
    pub async fn withdraw(&self, hash: &LeafHash) -> bool {
        self.batch.lock().await.withdraw(hash)
    }

    pub async fn status(&self, hash: &LeafHash) -> Option<BatchStatus> {
        self.batch.lock().await.status(hash)
    }

    pub async fn pending_len(&self) -> usize {
        self.batch.lock().await.pending_len()
    }

    pub fn state(&self) -> CommitState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CommitState> {
        self.state.subscribe()
    }

    /// Stop any polling commit. The interrupted batch goes back to pending.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run one commit over the pending batch.
    pub async fn commit(&self) -> Result<CommitReport, CommitError> {
        let _slot = self
            .in_flight
            .try_lock()
            .map_err(|_| CommitError::CommitInProgress)?;

        self.transition(CommitState::Digesting);
        let tree = self.batch.lock().await.digest(self.config.max_batch_size);
        let tree = match tree {
            Some(tree) => tree,
            None => {
                debug!("Nothing to commit");
                self.transition(CommitState::Idle);
                return Ok(CommitReport::default());
            }
        };
        info!(root = %tree.root(), leaves = tree.leaf_count(), "Digested batch");

        match self.run(&tree).await {
            Ok(report) => {
                self.batch.lock().await.complete();
                self.transition(CommitState::Done);
                Ok(report)
            }
            Err(err) => {
                let restored = self.batch.lock().await.restore();
                error!(root = %tree.root(), restored, error = %err, "Commit failed");
                self.transition(CommitState::Failed);
                Err(err)
            }
        }
    }

    async fn run(&self, tree: &MerkleTree) -> Result<CommitReport, CommitError> {
        let root = *tree.root();
        let from_level = self
            .source
            .fetch_header(&BlockId::Head)
            .await
            .map_err(CommitError::Chain)?
            .level;

        let operation = self.submit(&root).await?;
        info!(%operation, root = %root, level = from_level, "Submitted batch root");
        self.transition(CommitState::Submitted);

        let deadline = Instant::now() + self.config.max_confirmation_wait();

        self.transition(CommitState::AwaitingInclusion);
        let level = self.await_inclusion(&operation, from_level, deadline).await?;

        self.transition(CommitState::AwaitingConfirmations);
        self.await_confirmations(&operation, level, deadline).await?;

        self.transition(CommitState::BuildingProofs);
        let block = self
            .source
            .fetch_block(&BlockId::Level(level))
            .await
            .map_err(CommitError::Chain)?;
        let block_hash = block.hash.clone();
        let proofs = build_proofs(block, operation.clone(), tree.clone()).await?;
        info!(%operation, level, block = %block_hash, leaves = proofs.len(), "Built timestamp proofs");

        Ok(CommitReport {
            commitment: Some(Commitment {
                root,
                operation,
                level,
                block_hash,
            }),
            proofs,
        })
    }

    /// Hand the root to the committer, bounded by the confirmation wait and
    /// abandoned on shutdown.
    async fn submit(&self, root: &Digest) -> Result<String, CommitError> {
        let limit = self.config.max_confirmation_wait();
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                warn!(root = %root, "Submission abandoned on shutdown");
                Err(CommitError::Cancelled)
            }
            submitted = tokio::time::timeout(limit, self.committer.submit(root)) => match submitted {
                Ok(result) => result.map_err(CommitError::Submission),
                Err(_) => Err(CommitError::SubmissionTimeout(limit)),
            },
        }
    }

    /// Scan blocks after `from_level` until one carries the operation.
    async fn await_inclusion(
        &self,
        operation: &str,
        from_level: i32,
        deadline: Instant,
    ) -> Result<i32, CommitError> {
        let last = from_level.saturating_add(self.config.max_lookahead_blocks as i32);
        let mut next = from_level + 1;

        loop {
            match self.source.fetch_header(&BlockId::Head).await {
                Ok(head) => {
                    while next <= head.level.min(last) {
                        match self.source.fetch_block(&BlockId::Level(next)).await {
                            Ok(block) if block.contains_operation(operation) => {
                                info!(%operation, level = next, block = %block.hash, "Operation included");
                                return Ok(next);
                            }
                            Ok(_) => next += 1,
                            Err(err) if err.is_not_found() => {
                                debug!(level = next, "Block not available yet");
                                break;
                            }
                            Err(err) => {
                                warn!(level = next, error = %err, "Block fetch failed");
                                break;
                            }
                        }
                    }
                }
                Err(err) => warn!(error = %err, "Head poll failed"),
            }

            if next > last || !self.pause(deadline).await? {
                return Err(CommitError::ConfirmationTimeout {
                    operation: operation.to_string(),
                    from_level,
                    to_level: next - 1,
                });
            }
        }
    }

    /// Poll the head until it is `required_confirmations` past `level`.
    async fn await_confirmations(
        &self,
        operation: &str,
        level: i32,
        deadline: Instant,
    ) -> Result<(), CommitError> {
        let target = level.saturating_add(self.config.required_confirmations as i32);
        let mut head_level = level;

        loop {
            match self.source.fetch_header(&BlockId::Head).await {
                Ok(head) if head.level >= target => {
                    info!(%operation, level, head = head.level, "Operation confirmed");
                    return Ok(());
                }
                Ok(head) => {
                    head_level = head.level;
                    debug!(head = head.level, target, "Waiting for confirmations");
                }
                Err(err) => warn!(error = %err, "Head poll failed"),
            }

            if !self.pause(deadline).await? {
                return Err(CommitError::ConfirmationTimeout {
                    operation: operation.to_string(),
                    from_level: level,
                    to_level: head_level,
                });
            }
        }
    }

    /// Wait one poll interval. Returns false once the deadline has passed.
    async fn pause(&self, deadline: Instant) -> Result<bool, CommitError> {
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(CommitError::Cancelled),
            _ = tokio::time::sleep(self.config.poll_interval()) => Ok(true),
        }
    }

    fn transition(&self, state: CommitState) {
        info!(state = %state, "Commit state changed");
        self.state.send_replace(state);
    }
}

async fn build_proofs(
    block: BlockData,
    operation: String,
    tree: MerkleTree,
) -> Result<HashMap<LeafHash, TimestampProof>, CommitError> {
    let proofs = tokio::task::spawn_blocking(move || -> Result<_, ProofError> {
        let generator = ProofGenerator::new(&block)?;
        let block_proof = generator.block_proof(&operation, tree.root())?;
        Ok(leaf_proofs(&tree, &block_proof)?.into_iter().collect())
    })
    .await
    .map_err(|err| CommitError::Worker(err.to_string()))??;
    Ok(proofs)
}
