//! Durable stamp job queue
//!
//! Jobs survive restarts in sled. A job is offered to commits until one
//! succeeds, it fails `retry_limit` commits, or it outlives `expire_after`.

use chrono::{DateTime, Duration, Utc};
use cst_types::{LeafHash, SerializedProof, StampRequest};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Corrupt queue record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Completed,
    Failed,
    Expired,
}

/// A stamp request and its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampJob {
    pub hash: LeafHash,
    pub file_id: Option<String>,
    pub webhooks: Vec<String>,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
}

impl StampJob {
    /// Archive stem for this job's proof.
    pub fn archive_stem(&self) -> String {
        self.file_id.clone().unwrap_or_else(|| self.hash.to_hex())
    }
}

/// Final word on a job, handed to the completion callback.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub state: JobState,
    pub request: StampJob,
    pub response: Option<SerializedProof>,
    pub error: Option<String>,
}

/// Jobs ready for a commit and jobs that expired while waiting.
#[derive(Debug, Default)]
pub struct DueJobs {
    pub ready: Vec<StampJob>,
    pub expired: Vec<JobOutcome>,
}

pub struct StampQueue {
    jobs: sled::Tree,
    config: QueueConfig,
}

impl StampQueue {
    pub fn open(path: &Path, config: QueueConfig) -> Result<Self> {
        Self::from_db(&sled::open(path)?, config)
    }

    pub fn temporary(config: QueueConfig) -> Result<Self> {
        Self::from_db(&sled::Config::new().temporary(true).open()?, config)
    }

    /// Keep jobs in a tree of an already open database.
    pub fn from_db(db: &sled::Db, config: QueueConfig) -> Result<Self> {
        Ok(Self {
            jobs: db.open_tree("stamp_jobs")?,
            config,
        })
    }

    /// Enqueue a request. A hash that is already queued keeps its job and
    /// gains any new webhooks.
    pub fn schedule(&self, request: StampRequest, now: DateTime<Utc>) -> Result<StampJob> {
        let job = match self.get(&request.hash)? {
            Some(mut job) => {
                for url in request.webhooks {
                    if !job.webhooks.contains(&url) {
                        job.webhooks.push(url);
                    }
                }
                if job.file_id.is_none() {
                    job.file_id = request.file_id;
                }
                job
            }
            None => {
                debug!(hash = %request.hash, "Stamp job scheduled");
                StampJob {
                    hash: request.hash,
                    file_id: request.file_id,
                    webhooks: request.webhooks,
                    attempts: 0,
                    enqueued_at: now,
                    not_before: now,
                }
            }
        };
        self.put(&job)?;
        Ok(job)
    }

    pub fn get(&self, hash: &LeafHash) -> Result<Option<StampJob>> {
        match self.jobs.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` jobs whose backoff has elapsed, oldest first. Expired
    /// jobs are removed and reported instead.
    pub fn take_due(&self, now: DateTime<Utc>, limit: usize) -> Result<DueJobs> {
        let expire_after = Duration::seconds(self.config.expire_after_secs as i64);
        let mut due = DueJobs::default();

        for item in self.jobs.iter() {
            let (_, bytes) = item?;
            let job: StampJob = serde_json::from_slice(&bytes)?;
            if now - job.enqueued_at >= expire_after {
                due.expired.push(JobOutcome {
                    state: JobState::Expired,
                    request: job,
                    response: None,
                    error: None,
                });
            } else if job.not_before <= now {
                due.ready.push(job);
            }
        }

        for outcome in &due.expired {
            self.jobs.remove(outcome.request.hash.as_bytes())?;
            warn!(hash = %outcome.request.hash, "Stamp job expired");
        }

        due.ready.sort_by_key(|job| job.enqueued_at);
        due.ready.truncate(limit);
        Ok(due)
    }

    /// The job's proof was issued.
    pub fn complete(&self, hash: &LeafHash, proof: SerializedProof) -> Result<Option<JobOutcome>> {
        let Some(job) = self.get(hash)? else {
            return Ok(None);
        };
        self.jobs.remove(hash.as_bytes())?;
        Ok(Some(JobOutcome {
            state: JobState::Completed,
            request: job,
            response: Some(proof),
            error: None,
        }))
    }

    /// A commit containing the job failed. Returns an outcome once the job
    /// has used up its retries or the failure can never clear.
    pub fn fail(
        &self,
        hash: &LeafHash,
        error: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<JobOutcome>> {
        let Some(mut job) = self.get(hash)? else {
            return Ok(None);
        };
        job.attempts += 1;

        if !retryable || job.attempts >= self.config.retry_limit {
            self.jobs.remove(hash.as_bytes())?;
            info!(hash = %hash, attempts = job.attempts, "Stamp job failed");
            return Ok(Some(JobOutcome {
                state: JobState::Failed,
                request: job,
                response: None,
                error: Some(error.to_string()),
            }));
        }

        job.not_before = now + Duration::seconds(self.config.retry_backoff_secs as i64);
        self.put(&job)?;
        Ok(None)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn put(&self, job: &StampJob) -> Result<()> {
        self.jobs.insert(job.hash.as_bytes(), serde_json::to_vec(job)?)?;
        Ok(())
    }
}
