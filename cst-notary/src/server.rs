//! Notary server implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cst_client::RpcChainClient;

use crate::api::router;
use crate::config::NotaryConfig;
use crate::error::CommitError;
use crate::service::{NotaryService, ServiceError};
use crate::wallet::OctezClientCommitter;

/// The main notary server
pub struct NotaryServer {
    config: NotaryConfig,
    service: Arc<NotaryService>,
    shutdown: CancellationToken,
}

impl NotaryServer {
    /// Create a new notary server talking to the configured node and wallet
    pub fn new(config: NotaryConfig) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing notary server");

        let source = Arc::new(RpcChainClient::new(&config.chain.rpc_url)?);
        let committer = Arc::new(OctezClientCommitter::new(&config.chain));
        let shutdown = CancellationToken::new();
        let service = NotaryService::open(&config, source, committer, shutdown.clone())?;

        info!(
            rpc = %config.chain.rpc_url,
            contract = %config.chain.contract,
            confirmations = config.commit.required_confirmations,
            "Notary service ready"
        );

        Ok(Self::with_service(config, Arc::new(service), shutdown))
    }

    /// Serve an already assembled service
    pub fn with_service(config: NotaryConfig, service: Arc<NotaryService>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            service,
            shutdown,
        }
    }

    pub fn service(&self) -> &Arc<NotaryService> {
        &self.service
    }

    /// Stop the server and interrupt any commit that is polling the chain
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run the HTTP server on the configured address
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await?;
        Ok(())
    }

    /// Run the HTTP server and the commit timer until ctrl-c or shutdown
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        info!("Starting HTTP server on {}", listener.local_addr()?);

        let timer = spawn_commit_timer(
            self.service.clone(),
            self.config.commit.commit_interval_secs,
            self.shutdown.clone(),
        );

        let shutdown = self.shutdown.clone();
        axum::serve(listener, router(self.service.clone()))
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = shutdown.cancelled() => {}
                }
                info!("Shutting down notary server");
                shutdown.cancel();
            })
            .await?;

        if let Some(timer) = timer {
            timer.await.ok();
        }
        Ok(())
    }
}

/// Commit the queue every `interval_secs` seconds. Zero disables the timer.
fn spawn_commit_timer(
    service: Arc<NotaryService>,
    interval_secs: u64,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    match service.commit_queued().await {
                        Ok(summary) if summary.success > 0 => info!(
                            proofs = summary.success,
                            operation = ?summary.operation,
                            level = ?summary.level,
                            "Periodic commit done"
                        ),
                        Ok(_) => debug!("Periodic commit found nothing to do"),
                        Err(ServiceError::Commit(CommitError::CommitInProgress)) => {
                            debug!("Commit already running, skipping tick")
                        }
                        Err(err) => warn!(error = %err, "Periodic commit failed"),
                    }
                }
            }
        }
        debug!("Commit timer stopped");
    }))
}
