//! Block source backed by a node's JSON RPC

use std::time::Duration;

use async_trait::async_trait;
use cst_core::{BlockId, BlockSource, ChainError};
use cst_types::{BlockData, HeaderSummary};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{ClientError, Result};

/// Reads blocks and headers from `{rpc}/chains/{chain}/blocks/{id}`.
#[derive(Clone)]
pub struct RpcChainClient {
    http: Client,
    base: Url,
    chain: String,
    timeout: Duration,
}

impl RpcChainClient {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let base = Url::parse(rpc_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Network(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;
        Ok(Self {
            http: Client::new(),
            base,
            chain: "main".to_string(),
            timeout: Duration::from_secs(10),
        })
    }

    /// Query another chain than `main`, e.g. a chain id
    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = chain.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn block_url(&self, id: &BlockId, suffix: &str) -> String {
        format!(
            "{}/chains/{}/blocks/{}{}",
            self.base.as_str().trim_end_matches('/'),
            self.chain,
            id,
            suffix
        )
    }

    async fn get<T: DeserializeOwned>(&self, id: &BlockId, suffix: &str) -> std::result::Result<T, ChainError> {
        let url = self.block_url(id, suffix);
        debug!(%url, "RPC request");

        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if status == StatusCode::NOT_FOUND {
            return Err(ChainError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(ChainError::Rpc {
                status: status.as_u16(),
                message: body.trim().to_string(),
            });
        }

        serde_json::from_str(&body).map_err(|e| ChainError::Decode(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl BlockSource for RpcChainClient {
    async fn fetch_block(&self, id: &BlockId) -> std::result::Result<BlockData, ChainError> {
        self.get(id, "").await
    }

    async fn fetch_header(&self, id: &BlockId) -> std::result::Result<HeaderSummary, ChainError> {
        self.get(id, "/header").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_urls() {
        let client = RpcChainClient::new("http://localhost:8732/").unwrap();
        assert_eq!(
            client.block_url(&BlockId::Level(42), "/header"),
            "http://localhost:8732/chains/main/blocks/42/header"
        );
        assert_eq!(
            client.block_url(&BlockId::Head, ""),
            "http://localhost:8732/chains/main/blocks/head"
        );

        let client = client.with_chain("NetXdQprcVkpaWU");
        assert_eq!(
            client.block_url(&BlockId::Hash("BLockHash".to_string()), ""),
            "http://localhost:8732/chains/NetXdQprcVkpaWU/blocks/BLockHash"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(RpcChainClient::new("not a url"), Err(ClientError::Network(_))));
    }
}
