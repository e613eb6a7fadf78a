//! Test utilities for running an in-process notary against a simulated chain.
//!
//! Enabled via the `test-util` feature flag.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use cst_core::testutil::{block_at, commitment_operation, foreign_operation};
use cst_core::{BlockId, BlockSource, ChainError, RootCommitter};
use cst_types::block::OperationEntry;
use cst_types::{BlockData, Digest, HeaderSummary};

use crate::archive::SledArchive;
use crate::config::{CommitConfig, NotaryConfig, QueueConfig, WebhookConfig};
use crate::orchestrator::StampingOrchestrator;
use crate::queue::StampQueue;
use crate::server::NotaryServer;
use crate::service::NotaryService;
use crate::webhook::WebhookDispatcher;

/// Block time of the simulated chain.
pub fn block_timestamp(level: i32) -> DateTime<Utc> {
    Utc.timestamp_opt(1_640_995_200 + level as i64 * 30, 0)
        .single()
        .expect("valid timestamp")
}

/// An in-memory chain that bakes a block every time its head is polled once
/// a root has been submitted.
///
/// Submitted roots become commitment operations included in the next baked
/// block. A pinned block (a fixture) replaces the synthetic block at
/// its level, and its operation hash is returned for every submission.
pub struct MockChain {
    state: Mutex<ChainState>,
}

struct ChainState {
    head: i32,
    blocks: BTreeMap<i32, BlockData>,
    pinned: Option<(BlockData, String)>,
    queued: Vec<OperationEntry>,
    include: bool,
    reject: Option<String>,
    hang: bool,
    submitted: Vec<Digest>,
    calls: usize,
    counter: u64,
}

impl ChainState {
    fn block(&mut self, level: i32) -> Option<BlockData> {
        if level > self.head || level < 0 {
            return None;
        }
        let block = self.blocks.entry(level).or_insert_with(|| {
            block_at(level, block_timestamp(level), vec![foreign_operation(level as u64 + 1_000)])
        });
        Some(block.clone())
    }

    fn bake(&mut self) {
        self.head += 1;
        let level = self.head;
        let block = match &self.pinned {
            Some((block, _)) if block.header.level == level => block.clone(),
            _ => {
                let mut manager = vec![foreign_operation(level as u64 + 1_000)];
                if self.include {
                    manager.append(&mut self.queued);
                }
                block_at(level, block_timestamp(level), manager)
            }
        };
        self.blocks.insert(level, block);
    }

    fn find_by_hash(&self, hash: &str) -> Option<BlockData> {
        self.blocks.values().find(|block| block.hash == hash).cloned()
    }
}

impl MockChain {
    pub fn new(head: i32) -> Self {
        Self {
            state: Mutex::new(ChainState {
                head,
                blocks: BTreeMap::new(),
                pinned: None,
                queued: Vec::new(),
                include: true,
                reject: None,
                hang: false,
                submitted: Vec::new(),
                calls: 0,
                counter: 0,
            }),
        }
    }

    /// A chain whose next block is `block`, which carries `operation`.
    pub fn with_fixture(block: BlockData, operation: &str) -> Self {
        let chain = Self::new(block.header.level - 1);
        chain.lock().pinned = Some((block, operation.to_string()));
        chain
    }

    /// Keep baking blocks but never include submitted operations.
    pub fn stalled(self) -> Self {
        self.lock().include = false;
        self
    }

    /// Fail every submission with `message`.
    pub fn rejecting_submissions(self, message: &str) -> Self {
        self.lock().reject = Some(message.to_string());
        self
    }

    /// Never answer a submission, like a wallet stuck on an unreachable node.
    pub fn hanging_submissions(self) -> Self {
        self.lock().hang = true;
        self
    }

    /// Roots submitted so far.
    pub fn submissions(&self) -> Vec<Digest> {
        self.lock().submitted.clone()
    }

    /// Number of reads and submissions served.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    pub fn head_level(&self) -> i32 {
        self.lock().head
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().expect("mock chain lock poisoned")
    }
}

#[async_trait]
impl BlockSource for MockChain {
    async fn fetch_block(&self, id: &BlockId) -> Result<BlockData, ChainError> {
        let mut state = self.lock();
        state.calls += 1;
        let block = match id {
            BlockId::Head => {
                let head = state.head;
                state.block(head)
            }
            BlockId::Level(level) => state.block(*level),
            BlockId::Hash(hash) => state.find_by_hash(hash),
        };
        block.ok_or_else(|| ChainError::NotFound(id.to_string()))
    }

    async fn fetch_header(&self, id: &BlockId) -> Result<HeaderSummary, ChainError> {
        let mut state = self.lock();
        state.calls += 1;
        let block = match id {
            BlockId::Head => {
                if !state.submitted.is_empty() {
                    state.bake();
                }
                let head = state.head;
                state.block(head)
            }
            BlockId::Level(level) => state.block(*level),
            BlockId::Hash(hash) => state.find_by_hash(hash),
        };
        block
            .map(|block| HeaderSummary::from(&block))
            .ok_or_else(|| ChainError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl RootCommitter for MockChain {
    async fn submit(&self, root: &Digest) -> Result<String, ChainError> {
        let hang = {
            let mut state = self.lock();
            state.calls += 1;
            state.hang
        };
        if hang {
            return std::future::pending().await;
        }

        let mut state = self.lock();
        if let Some(message) = &state.reject {
            return Err(ChainError::Submission(message.clone()));
        }
        state.submitted.push(*root);

        if let Some((_, operation)) = &state.pinned {
            return Ok(operation.clone());
        }
        state.counter += 1;
        let operation = commitment_operation(root, state.counter);
        let hash = operation.hash.clone();
        state.queued.push(operation);
        Ok(hash)
    }
}

/// Commit settings that make a simulated commit finish in milliseconds.
pub fn fast_commit_config() -> CommitConfig {
    CommitConfig {
        required_confirmations: 2,
        poll_interval_ms: 1,
        max_lookahead_blocks: 5,
        max_confirmation_wait_secs: 30,
        commit_interval_secs: 0,
        max_batch_size: 100,
    }
}

/// A service over `chain` with temporary storage.
pub fn test_service(chain: Arc<MockChain>, commit: CommitConfig, shutdown: CancellationToken) -> NotaryService {
    let max_batch_size = commit.max_batch_size;
    let orchestrator =
        StampingOrchestrator::new(commit, chain.clone(), chain).with_shutdown(shutdown);
    let queue = StampQueue::temporary(QueueConfig::default()).expect("temporary queue");
    let archive = Arc::new(SledArchive::temporary().expect("temporary archive"));
    let webhooks = WebhookDispatcher::new(WebhookConfig {
        retry_limit: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        timeout_ms: 2_000,
    })
    .expect("webhook client");
    NotaryService::new(orchestrator, queue, archive, webhooks, max_batch_size)
}

/// A test notary server bound to a random port on localhost.
pub struct TestServer {
    /// The address the server is listening on
    addr: SocketAddr,
    /// The simulated chain behind the server
    chain: Arc<MockChain>,
    service: Arc<NotaryService>,
    shutdown: CancellationToken,
}

impl TestServer {
    /// Start a test server over a fresh simulated chain.
    pub async fn start() -> Self {
        Self::start_with_chain(Arc::new(MockChain::new(1_000))).await
    }

    /// Start a test server over the given chain.
    pub async fn start_with_chain(chain: Arc<MockChain>) -> Self {
        let shutdown = CancellationToken::new();
        let service = Arc::new(test_service(chain.clone(), fast_commit_config(), shutdown.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().expect("Failed to get local address");

        let config = NotaryConfig {
            commit: fast_commit_config(),
            ..NotaryConfig::default()
        };
        let server = NotaryServer::with_service(config, service.clone(), shutdown.clone());
        tokio::spawn(async move {
            server.serve(listener).await.expect("Test server failed");
        });

        Self {
            addr,
            chain,
            service,
            shutdown,
        }
    }

    /// Get the server's listening address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server URL suitable for client connection (e.g., "http://127.0.0.1:12345")
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn chain(&self) -> &Arc<MockChain> {
        &self.chain
    }

    pub fn service(&self) -> &Arc<NotaryService> {
        &self.service
    }

    /// Shut down the test server
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
