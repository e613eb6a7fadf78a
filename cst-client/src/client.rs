//! Client implementation for communicating with notary servers

use std::path::Path;
use std::time::Duration;

use cst_core::{verify_proof, BlockSource};
use cst_types::messages::ErrorResponse;
use cst_types::{
    AnyProof, CommitSummary, Digest, HeaderSummary, SerializedProof, StampRequest, StampResponse,
    StateResponse, TimestampProof,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tracing::{debug, warn};

use crate::{ClientError, Result};

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: u32,
    /// Initial backoff duration before first retry
    pub initial_backoff: Duration,
    /// Maximum backoff duration (caps exponential growth)
    pub max_backoff: Duration,
    /// Multiplier applied to backoff after each retry
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry `attempt` (0-indexed), with jitter in [0.5, 1.0]
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter = 0.5 + rand::random::<f64>() * 0.5;
        Duration::from_secs_f64(capped * jitter)
    }
}

/// What `GET /health` reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub commit_state: String,
    pub queued: usize,
}

/// Leaf hash of a file's contents as submitted to the notary
pub fn leaf_hash(data: &[u8]) -> Digest {
    Digest::new(Sha256::digest(data).into())
}

/// Parse a serialized proof that must carry its network and block timestamp
pub fn load_timestamp_proof(json: &str) -> Result<TimestampProof> {
    let serialized = SerializedProof::from_json(json).map_err(|e| ClientError::InvalidProof(e.to_string()))?;
    timestamp_proof(serialized)
}

pub fn timestamp_proof(serialized: SerializedProof) -> Result<TimestampProof> {
    match AnyProof::try_from(serialized).map_err(|e| ClientError::InvalidProof(e.to_string()))? {
        AnyProof::Timestamped(proof) => Ok(proof),
        AnyProof::Plain(_) => Err(ClientError::InvalidProof(
            "proof has no network or timestamp".to_string(),
        )),
    }
}

/// HTTP client for a CST notary
#[derive(Clone)]
pub struct NotaryClient {
    /// The server URL, without a trailing slash
    pub server_url: String,
    http: reqwest::Client,
    timeout: Duration,
    /// Retry configuration (None = no retries)
    retry_config: Option<RetryConfig>,
}

impl NotaryClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
            retry_config: None,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable retry with the given configuration
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Queue a hash for the next commit
    pub async fn stamp(&self, request: &StampRequest) -> Result<StampResponse> {
        let url = format!("{}/api/stamp", self.server_url);
        let response = self.execute(|| self.http.post(&url).json(request)).await?;
        read_json(response).await
    }

    /// Queue the leaf hash of a file
    pub async fn stamp_file(&self, path: &Path, file_id: Option<String>, webhooks: Vec<String>) -> Result<(Digest, StampResponse)> {
        let data = std::fs::read(path)
            .map_err(|e| ClientError::Storage(format!("Failed to read file: {}", e)))?;
        let request = StampRequest {
            hash: leaf_hash(&data),
            file_id,
            webhooks,
        };
        let response = self.stamp(&request).await?;
        Ok((request.hash, response))
    }

    /// Archived state and proof status of a hash, `None` if the notary never saw it
    pub async fn state(&self, hash: &Digest) -> Result<Option<StateResponse>> {
        let url = format!("{}/api/state/{}", self.server_url, hash.to_hex());
        let response = self.execute(|| self.http.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await.map(Some)
    }

    /// Ask the notary to commit its queue now
    pub async fn commit(&self) -> Result<CommitSummary> {
        let url = format!("{}/api/commit", self.server_url);
        let response = self.execute(|| self.http.post(&url)).await?;
        read_json(response).await
    }

    /// Check server health
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = format!("{}/health", self.server_url);
        let response = self.execute(|| self.http.get(&url)).await?;
        read_json(response).await
    }

    /// Verify a proof against a node and return the block header it commits to
    pub async fn verify<S>(&self, proof: &TimestampProof, source: &S) -> Result<HeaderSummary>
    where
        S: BlockSource + ?Sized,
    {
        Ok(verify_proof(proof, source).await?)
    }

    /// Send a request, retrying transient failures
    async fn execute<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.retry_config.as_ref().map(|c| c.max_retries + 1).unwrap_or(1);
        let mut attempt = 0;

        loop {
            let result = build().timeout(self.timeout).send().await.map_err(ClientError::from);
            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            attempt += 1;
            let retry = match &self.retry_config {
                Some(config) if is_retryable(&err) && attempt < max_attempts => config,
                _ => return Err(err),
            };
            let backoff = retry.backoff_for_attempt(attempt - 1);
            warn!(
                "Retry attempt {}/{} after {:?}: {}",
                attempt,
                max_attempts - 1,
                backoff,
                err
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

/// Decode a successful response, or turn the notary's error body into `Rejected`
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.text().await?;
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    debug!(status = status.as_u16(), %message, "Notary rejected request");
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Determine if an error is retryable (transient network issues)
fn is_retryable(err: &ClientError) -> bool {
    match err {
        ClientError::Network(_) | ClientError::Timeout => true,
        ClientError::Rejected { .. }
        | ClientError::VerificationFailed(_)
        | ClientError::InvalidProof(_)
        | ClientError::Storage(_) => false,
    }
}
