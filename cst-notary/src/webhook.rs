//! Webhook delivery for committed proofs

use std::time::Duration;
use cst_types::WebhookPayload;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::WebhookConfig;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Webhook {url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("Webhook {url} unreachable: {message}")]
    Transport { url: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// POSTs proofs to caller-supplied URLs, retrying with exponential backoff.
#[derive(Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| WebhookError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Deliver in the background. Failures are logged, never reported back.
    pub fn dispatch(&self, url: String, payload: WebhookPayload) -> tokio::task::JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.deliver(&url, &payload).await {
                Ok(attempts) => info!(%url, hash = %payload.hash, attempts, "Webhook delivered"),
                Err(err) => warn!(%url, hash = %payload.hash, error = %err, "Webhook delivery abandoned"),
            }
        })
    }

    /// Deliver with retries. Returns the number of attempts used.
    pub async fn deliver(&self, url: &str, payload: &WebhookPayload) -> Result<u32, WebhookError> {
        let max_attempts = self.config.retry_limit.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.client.post(url).json(payload).send().await {
                Ok(response) if response.status().is_success() => return Ok(attempt),
                Ok(response) => WebhookError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                },
                Err(e) => WebhookError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                },
            };

            if attempt >= max_attempts {
                return Err(err);
            }
            let backoff = self.backoff_for_attempt(attempt - 1);
            debug!(%url, attempt, error = %err, backoff_ms = backoff.as_millis() as u64, "Retrying webhook");
            tokio::time::sleep(backoff).await;
        }
    }

    /// Backoff before retry `attempt` (0-indexed), jittered into [0.5, 1.0] of the cap.
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.initial_backoff_ms as f64 * 2f64.powi(attempt as i32);
        let capped = base.min(self.config.max_backoff_ms as f64);
        let jitter = 0.5 + rand::random::<f64>() * 0.5;
        Duration::from_secs_f64(capped * jitter / 1000.0)
    }
}
