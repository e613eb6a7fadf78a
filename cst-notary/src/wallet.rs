//! Root submission through the node's wallet CLI

use async_trait::async_trait;
use cst_core::{ChainError, RootCommitter};
use cst_types::Digest;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ChainConfig;

const OPERATION_HASH_MARKER: &str = "Operation hash is '";

/// Extract the injected operation hash from the wallet's transfer output.
pub fn parse_operation_hash(output: &str) -> Option<String> {
    let start = output.find(OPERATION_HASH_MARKER)? + OPERATION_HASH_MARKER.len();
    let rest = &output[start..];
    let end = rest.find('\'')?;
    let hash = &rest[..end];
    hash.starts_with('o').then(|| hash.to_string())
}

/// Calls the contract's default entrypoint with the root as `bytes`.
pub struct OctezClientCommitter {
    binary: PathBuf,
    endpoint: String,
    source: String,
    contract: String,
    burn_cap: String,
    password: Option<String>,
}

impl OctezClientCommitter {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            binary: config.wallet_binary.clone(),
            endpoint: config.rpc_url.clone(),
            source: config.wallet_source.clone(),
            contract: config.contract.clone(),
            burn_cap: config.burn_cap.clone(),
            password: config.wallet_password.clone(),
        }
    }

    fn arguments(&self, root: &Digest) -> Vec<String> {
        vec![
            "--endpoint".into(),
            self.endpoint.clone(),
            "transfer".into(),
            "0".into(),
            "from".into(),
            self.source.clone(),
            "to".into(),
            self.contract.clone(),
            "--arg".into(),
            format!("0x{}", root.to_hex()),
            "--burn-cap".into(),
            self.burn_cap.clone(),
        ]
    }
}

#[async_trait]
impl RootCommitter for OctezClientCommitter {
    async fn submit(&self, root: &Digest) -> Result<String, ChainError> {
        let mut command = Command::new(&self.binary);
        command
            .args(self.arguments(root))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), root = %root, "Invoking wallet");
        let mut child = command
            .spawn()
            .map_err(|e| ChainError::Submission(format!("failed to start {}: {}", self.binary.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(password) = &self.password {
                stdin
                    .write_all(format!("{}\n", password).as_bytes())
                    .await
                    .map_err(|e| ChainError::Submission(format!("failed to unlock wallet: {}", e)))?;
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ChainError::Submission(e.to_string()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChainError::Submission(format!(
                "wallet exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let operation = parse_operation_hash(&stdout).ok_or_else(|| {
            ChainError::Submission("wallet output carries no operation hash".to_string())
        })?;
        info!(%operation, contract = %self.contract, "Root injected");
        Ok(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_OUTPUT: &str = "Node is bootstrapped.\n\
        Estimated gas: 1427.120 units (will add 100 for safety)\n\
        Operation successfully injected in the node.\n\
        Operation hash is 'onnEUiG3oRZDgLrhty9bcUCZSuR9VF9DTk9Czmf97U1andenMW1'\n\
        Waiting for the operation to be included...\n";

    #[test]
    fn test_parse_operation_hash() {
        assert_eq!(
            parse_operation_hash(TRANSFER_OUTPUT).as_deref(),
            Some("onnEUiG3oRZDgLrhty9bcUCZSuR9VF9DTk9Czmf97U1andenMW1")
        );
        assert_eq!(parse_operation_hash("Fatal error: counter in the past"), None);
        assert_eq!(parse_operation_hash("Operation hash is ''"), None);
    }

    #[test]
    fn test_arguments_carry_root() {
        let committer = OctezClientCommitter::new(&crate::config::NotaryConfig::default().chain);
        let args = committer.arguments(&Digest::new([0xab; 32]));
        let arg = args.iter().position(|a| a == "--arg").unwrap();
        assert_eq!(args[arg + 1], format!("0x{}", "ab".repeat(32)));
        assert_eq!(args.last().map(String::as_str), Some("0.01"));
    }

    #[cfg(unix)]
    fn fake_wallet(dir: &std::path::Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("octez-client");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_submit_through_fake_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::NotaryConfig::default().chain;
        config.wallet_binary = fake_wallet(
            dir.path(),
            "echo \"Operation hash is 'ooTestHash'\"",
        );

        let committer = OctezClientCommitter::new(&config);
        let operation = committer.submit(&Digest::new([1; 32])).await.unwrap();
        assert_eq!(operation, "ooTestHash");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wallet_failure_is_submission_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::NotaryConfig::default().chain;
        config.wallet_binary = fake_wallet(dir.path(), "echo 'counter in the past' >&2\nexit 1");

        let committer = OctezClientCommitter::new(&config);
        match committer.submit(&Digest::new([1; 32])).await {
            Err(ChainError::Submission(message)) => assert!(message.contains("counter in the past")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
