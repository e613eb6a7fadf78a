//! Notary configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the wallet password, if the key is encrypted.
pub const WALLET_PASSWORD_ENV: &str = "CST_WALLET_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotaryConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Chain node and wallet configuration
    pub chain: ChainConfig,

    /// Commit state machine configuration
    pub commit: CommitConfig,

    /// Proof archive configuration
    pub archive: ArchiveConfig,

    /// Webhook delivery configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Stamp job queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Node RPC endpoint
    pub rpc_url: String,

    /// Chain identifier proofs are expected to carry
    pub network: String,

    /// Commitment contract address (`KT1...`)
    pub contract: String,

    /// Wallet CLI used to inject commitment transactions
    pub wallet_binary: PathBuf,

    /// Wallet alias or address paying for commitments
    pub wallet_source: String,

    /// Maximum burn per commitment, in tez
    pub burn_cap: String,

    /// Wallet password (provided via environment variable)
    #[serde(skip)]
    pub wallet_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Blocks required on top of the inclusion block
    pub required_confirmations: u32,

    /// Delay between chain polls (milliseconds)
    pub poll_interval_ms: u64,

    /// Blocks after submission searched for the operation
    pub max_lookahead_blocks: u32,

    /// Upper bound on waiting for the wallet, and separately on waiting for
    /// inclusion plus confirmations (seconds)
    pub max_confirmation_wait_secs: u64,

    /// Interval of the periodic commit timer (seconds, 0 disables it)
    pub commit_interval_secs: u64,

    /// Maximum number of queued stamps taken into one commit
    pub max_batch_size: usize,
}

impl CommitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_confirmation_wait(&self) -> Duration {
        Duration::from_secs(self.max_confirmation_wait_secs)
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            required_confirmations: 3,
            poll_interval_ms: 5_000,
            max_lookahead_blocks: 10,
            max_confirmation_wait_secs: 600,
            commit_interval_secs: 300,
            max_batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Directory of the archive database
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Delivery attempts per webhook before giving up
    pub retry_limit: u32,

    /// Delay before the first retry (milliseconds)
    pub initial_backoff_ms: u64,

    /// Cap on the delay between retries (milliseconds)
    pub max_backoff_ms: u64,

    /// Per-request timeout (milliseconds)
    pub timeout_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            retry_limit: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Commits a stamp may take part in before it is marked failed
    pub retry_limit: u32,

    /// Delay before a failed stamp is offered again (seconds)
    pub retry_backoff_secs: u64,

    /// Age after which an uncommitted stamp expires (seconds)
    pub expire_after_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            retry_backoff_secs: 60,
            expire_after_secs: 24 * 60 * 60,
        }
    }
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            chain: ChainConfig {
                rpc_url: "http://127.0.0.1:8732".to_string(),
                network: "NetXdQprcVkpaWU".to_string(),
                contract: "KT1...".to_string(),
                wallet_binary: PathBuf::from("octez-client"),
                wallet_source: "cst-notary".to_string(),
                burn_cap: "0.01".to_string(),
                wallet_password: None,
            },
            commit: CommitConfig::default(),
            archive: ArchiveConfig {
                path: PathBuf::from("cst-archive"),
            },
            webhook: WebhookConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl NotaryConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: NotaryConfig = toml::from_str(&contents)?;

        // Load the wallet password from the environment
        if config.chain.wallet_password.is_none() {
            config.chain.wallet_password = std::env::var(WALLET_PASSWORD_ENV).ok();
        }

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notary.toml");

        let config = NotaryConfig::default();
        config.to_file(&path).unwrap();
        let loaded = NotaryConfig::from_file(&path).unwrap();

        assert_eq!(loaded.server.port, 8080);
        assert_eq!(loaded.commit.required_confirmations, 3);
        assert_eq!(loaded.chain.burn_cap, "0.01");
        assert_eq!(loaded.webhook.retry_limit, 5);
    }

    #[test]
    fn test_optional_sections_default() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [chain]
            rpc_url = "https://rpc.example.net"
            network = "NetXdQprcVkpaWU"
            contract = "KT1FzuCxZqCMNYW9rGEHMpHdRsrjZ7eqFS3U"
            wallet_binary = "/usr/local/bin/octez-client"
            wallet_source = "stamper"
            burn_cap = "0.02"

            [commit]
            required_confirmations = 2
            poll_interval_ms = 1000
            max_lookahead_blocks = 5
            max_confirmation_wait_secs = 120
            commit_interval_secs = 0
            max_batch_size = 50

            [archive]
            path = "/var/lib/cst"
        "#;
        let config: NotaryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.commit.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.queue.retry_limit, 3);
        assert_eq!(config.webhook.max_backoff_ms, 60_000);
        assert!(config.chain.wallet_password.is_none());
    }
}
