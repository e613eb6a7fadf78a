//! Stamping service: queue in, proofs out

use std::sync::Arc;
use chrono::Utc;
use cst_core::{BlockSource, RootCommitter};
use cst_types::{
    CommitSummary, LeafHash, ProofState, SerializedProof, StampRequest, StampResponse, StateResponse,
    TimestampProof, WebhookPayload,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::archive::{proof_name, Archive, ArchiveError, SledArchive, PROOF_CONTENT_TYPE};
use crate::config::NotaryConfig;
use crate::error::CommitError;
use crate::orchestrator::StampingOrchestrator;
use crate::queue::{JobOutcome, QueueError, StampJob, StampQueue};
use crate::webhook::{WebhookDispatcher, WebhookError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("Stored proof is unreadable: {0}")]
    Encoding(#[from] cst_types::Error),

    #[error("Failed to open storage: {0}")]
    Storage(#[from] sled::Error),
}

/// Owns the job queue, the orchestrator and proof delivery.
///
/// Queued jobs stay in the queue until their proof is delivered, so a commit
/// holds `commit_lock` from taking its jobs until they are closed.
pub struct NotaryService {
    orchestrator: StampingOrchestrator,
    queue: StampQueue,
    commit_lock: Mutex<()>,
    archive: Arc<dyn Archive>,
    webhooks: WebhookDispatcher,
    max_batch_size: usize,
    outcomes: broadcast::Sender<JobOutcome>,
}

impl NotaryService {
    pub fn new(
        orchestrator: StampingOrchestrator,
        queue: StampQueue,
        archive: Arc<dyn Archive>,
        webhooks: WebhookDispatcher,
        max_batch_size: usize,
    ) -> Self {
        let (outcomes, _) = broadcast::channel(1024);
        Self {
            orchestrator,
            queue,
            commit_lock: Mutex::new(()),
            archive,
            webhooks,
            max_batch_size,
            outcomes,
        }
    }

    /// Open the archive database named in the config and wire everything up.
    pub fn open(
        config: &NotaryConfig,
        source: Arc<dyn BlockSource>,
        committer: Arc<dyn RootCommitter>,
        shutdown: CancellationToken,
    ) -> Result<Self, ServiceError> {
        let db = sled::open(&config.archive.path)?;
        let queue = StampQueue::from_db(&db, config.queue.clone())?;
        let archive = Arc::new(SledArchive::from_db(db)?);
        let orchestrator = StampingOrchestrator::new(config.commit.clone(), source, committer)
            .with_shutdown(shutdown);
        let webhooks = WebhookDispatcher::new(config.webhook.clone())?;

        info!(path = %config.archive.path.display(), queued = queue.len(), "Notary service opened");
        Ok(Self::new(orchestrator, queue, archive, webhooks, config.commit.max_batch_size))
    }

    pub fn orchestrator(&self) -> &StampingOrchestrator {
        &self.orchestrator
    }

    /// Terminal job outcomes: completed, failed or expired.
    pub fn outcomes(&self) -> broadcast::Receiver<JobOutcome> {
        self.outcomes.subscribe()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Queue a hash for the next commit, or return its proof if one exists.
    pub fn stamp(&self, request: StampRequest) -> Result<StampResponse, ServiceError> {
        if let Some(proof) = self.archived_proof(&request.hash)? {
            return Ok(StampResponse {
                proof: ProofState::committed(proof),
            });
        }
        let job = self.queue.schedule(request, Utc::now())?;
        info!(hash = %job.hash, file_id = ?job.file_id, "Stamp queued");
        Ok(StampResponse::pending())
    }

    /// Commit the due jobs and deliver their proofs.
    pub async fn commit_queued(&self) -> Result<CommitSummary, ServiceError> {
        let _commit = self
            .commit_lock
            .try_lock()
            .map_err(|_| CommitError::CommitInProgress)?;

        let now = Utc::now();
        let due = self.queue.take_due(now, self.max_batch_size)?;
        for outcome in due.expired {
            self.finish(outcome);
        }
        for job in &due.ready {
            self.orchestrator.stamp(job.hash).await;
        }

        let report = match self.orchestrator.commit().await {
            Ok(report) => report,
            Err(CommitError::CommitInProgress) => return Err(CommitError::CommitInProgress.into()),
            Err(err) => {
                self.release(&due.ready, &err, now).await?;
                return Err(err.into());
            }
        };

        let mut summary = CommitSummary::default();
        if let Some(commitment) = &report.commitment {
            summary.root = Some(commitment.root);
            summary.operation = Some(commitment.operation.clone());
            summary.block_hash = Some(commitment.block_hash.clone());
            summary.level = Some(commitment.level);
        }
        for job in &due.ready {
            if let Some(proof) = report.get(&job.hash) {
                self.deliver(job, proof)?;
                summary.success += 1;
            }
        }
        summary.completed = summary.success;
        Ok(summary)
    }

    /// Proof status of a hash, `None` if the notary has never seen it.
    pub async fn state(&self, hash: &LeafHash) -> Result<Option<StateResponse>, ServiceError> {
        let name = proof_name(&hash.to_hex());
        if let Some(stored) = self.archive.exists(&name)? {
            if let Some(proof) = self.archived_proof(hash)? {
                return Ok(Some(StateResponse {
                    file: Some(stored.state),
                    proof: ProofState::committed(proof),
                }));
            }
        }
        if self.queue.get(hash)?.is_some() || self.orchestrator.status(hash).await.is_some() {
            return Ok(Some(StateResponse {
                file: None,
                proof: ProofState::pending(),
            }));
        }
        Ok(None)
    }

    fn archived_proof(&self, hash: &LeafHash) -> Result<Option<SerializedProof>, ServiceError> {
        match self.archive.get(&proof_name(&hash.to_hex()))? {
            Some(bytes) => {
                let proof = serde_json::from_slice(&bytes).map_err(cst_types::Error::from)?;
                Ok(Some(proof))
            }
            None => Ok(None),
        }
    }

    /// Archive a committed proof, close its job and notify its webhooks.
    fn deliver(&self, job: &StampJob, proof: &TimestampProof) -> Result<(), ServiceError> {
        let serialized = SerializedProof::from(proof);
        let bytes = serialized.to_json_pretty()?.into_bytes();

        self.archive.put(&proof_name(&job.hash.to_hex()), &bytes, PROOF_CONTENT_TYPE)?;
        if job.file_id.is_some() {
            self.archive.put(&proof_name(&job.archive_stem()), &bytes, PROOF_CONTENT_TYPE)?;
        }

        for url in &job.webhooks {
            self.webhooks.dispatch(
                url.clone(),
                WebhookPayload {
                    hash: job.hash,
                    file_id: job.file_id.clone(),
                    proof: serialized.clone(),
                },
            );
        }

        if let Some(outcome) = self.queue.complete(&job.hash, serialized)? {
            self.finish(outcome);
        }
        Ok(())
    }

    /// Hand failed hashes back to the queue, which owns their retries.
    async fn release(
        &self,
        jobs: &[StampJob],
        err: &CommitError,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let message = err.to_string();
        for job in jobs {
            self.orchestrator.withdraw(&job.hash).await;
            if matches!(err, CommitError::Cancelled) {
                continue;
            }
            if let Some(outcome) = self.queue.fail(&job.hash, &message, err.is_retryable(), now)? {
                self.finish(outcome);
            }
        }
        Ok(())
    }

    fn finish(&self, outcome: JobOutcome) {
        match &outcome.error {
            Some(error) => warn!(hash = %outcome.request.hash, state = ?outcome.state, %error, "Stamp job finished"),
            None => info!(hash = %outcome.request.hash, state = ?outcome.state, "Stamp job finished"),
        }
        let _ = self.outcomes.send(outcome);
    }
}
