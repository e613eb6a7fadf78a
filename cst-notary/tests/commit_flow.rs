//! Commits against a simulated chain, from the orchestrator up to the service.

use std::sync::Arc;
use std::time::Duration;

use cst_core::{verify_proof, MerkleTree};
use cst_notary::testutil::{fast_commit_config, test_service, MockChain};
use cst_notary::config::CommitConfig;
use cst_notary::{CommitError, CommitState, JobState, ServiceError, StampingOrchestrator};
use cst_types::block::{OperationContent, MANAGER_PASS};
use cst_types::codec::{decode_check, BLOCK_HASH};
use cst_types::{BlockData, Digest, Operation, ProofStatus, StampRequest};
use tokio_util::sync::CancellationToken;

const HANGZHOU_BLOCK: &str = include_str!("../../cst-core/tests/fixtures/hangzhou_block.json");
const ITHACA_BLOCK: &str = include_str!("../../cst-core/tests/fixtures/ithaca_block.json");
const JAKARTA_BLOCK: &str = include_str!("../../cst-core/tests/fixtures/jakarta_block.json");

/// Hash of the fixture operation that carries `root` as its parameter.
fn commitment_hash(block: &BlockData, root: &Digest) -> String {
    block.operations[MANAGER_PASS]
        .iter()
        .find(|entry| {
            entry.contents.iter().any(|content| match content {
                OperationContent::Transaction(tx) => tx
                    .parameters
                    .as_ref()
                    .and_then(|p| p.value.get("bytes"))
                    .and_then(|v| v.as_str())
                    == Some(root.to_hex().as_str()),
                _ => false,
            })
        })
        .map(|entry| entry.hash.clone())
        .expect("fixture carries the commitment")
}

fn stamp(byte: u8, file_id: Option<&str>) -> StampRequest {
    StampRequest {
        hash: Digest::new([byte; 32]),
        file_id: file_id.map(str::to_string),
        webhooks: vec![],
    }
}

#[tokio::test]
async fn test_two_leaf_commit_against_fixture_blocks() {
    let h1 = Digest::new([0x11; 32]);
    let h2 = Digest::new([0x22; 32]);
    let root = *MerkleTree::from_leaves([h1, h2]).root();

    for json in [HANGZHOU_BLOCK, ITHACA_BLOCK, JAKARTA_BLOCK] {
        let block: BlockData = serde_json::from_str(json).unwrap();
        let operation = commitment_hash(&block, &root);
        let chain = Arc::new(MockChain::with_fixture(block.clone(), &operation));
        let notary = StampingOrchestrator::new(fast_commit_config(), chain.clone(), chain.clone());

        notary.stamp(h1).await;
        notary.stamp(h2).await;
        let report = notary.commit().await.unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(chain.submissions(), vec![root]);
        let commitment = report.commitment.clone().unwrap();
        assert_eq!(commitment.level, block.header.level);
        assert_eq!(commitment.operation, operation);

        let proof = report.get(&h1).unwrap();
        assert_eq!(proof.derivation(), decode_check(&block.hash, &BLOCK_HASH).unwrap());
        assert_eq!(proof.start(), h1.as_bytes());
        assert_eq!(
            &proof.proof.operations[..2],
            &[
                Operation::Hash2b,
                Operation::append(Digest::hash(h2.as_bytes()).to_vec()),
            ]
        );
        assert_eq!(report.get(&h2).unwrap().block_hash(), block.hash);

        let header = verify_proof(proof, chain.as_ref()).await.unwrap();
        assert_eq!(header.timestamp, block.header.timestamp);
    }
}

#[tokio::test]
async fn test_root_missing_from_block_fails_whole_batch() {
    let block: BlockData = serde_json::from_str(HANGZHOU_BLOCK).unwrap();
    let root = *MerkleTree::from_leaves([Digest::new([0x11; 32]), Digest::new([0x22; 32])]).root();
    let operation = commitment_hash(&block, &root);
    let chain = Arc::new(MockChain::with_fixture(block, &operation));
    let notary = StampingOrchestrator::new(fast_commit_config(), chain.clone(), chain);

    // A different batch: the fixture operation does not embed its root
    notary.stamp(Digest::new([0x33; 32])).await;
    notary.stamp(Digest::new([0x44; 32])).await;

    let err = notary.commit().await.unwrap_err();
    assert!(matches!(
        err,
        CommitError::Proof(cst_core::ProofError::RootHashNotEmbedded { .. })
    ));
    assert_eq!(notary.pending_len().await, 2);
}

#[tokio::test]
async fn test_service_archives_and_reports_committed() {
    let chain = Arc::new(MockChain::new(500));
    let service = test_service(chain.clone(), fast_commit_config(), CancellationToken::new());
    let mut outcomes = service.outcomes();

    service.stamp(stamp(1, Some("contract.pdf"))).unwrap();
    service.stamp(stamp(2, None)).unwrap();
    // Duplicate stamps collapse into one job
    service.stamp(stamp(2, None)).unwrap();
    assert_eq!(service.queued(), 2);

    let pending = service.state(&Digest::new([1; 32])).await.unwrap().unwrap();
    assert_eq!(pending.proof.status, ProofStatus::Pending);
    assert!(pending.file.is_none());

    let summary = service.commit_queued().await.unwrap();
    assert_eq!(summary.success, 2);
    assert_eq!(summary.level, Some(501));
    assert_eq!(service.queued(), 0);

    let state = service.state(&Digest::new([1; 32])).await.unwrap().unwrap();
    assert_eq!(state.proof.status, ProofStatus::Committed);
    let file = state.file.unwrap();
    assert_eq!(file.file.filename, format!("{}.proof.json", Digest::new([1; 32]).to_hex()));
    assert_eq!(file.file.content_type, "application/json");
    assert_eq!(state.proof.proof.unwrap().level, Some(501));

    let mut finished = vec![];
    for _ in 0..2 {
        let outcome = tokio::time::timeout(Duration::from_secs(1), outcomes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.state, JobState::Completed);
        assert!(outcome.response.is_some());
        finished.push(outcome.request.hash);
    }
    finished.sort();
    assert_eq!(finished, vec![Digest::new([1; 32]), Digest::new([2; 32])]);

    // Stamping a committed hash returns its proof straight away
    let again = service.stamp(stamp(1, None)).unwrap();
    assert_eq!(again.proof.status, ProofStatus::Committed);
    assert_eq!(service.queued(), 0);
}

#[tokio::test]
async fn test_empty_queue_commit_is_silent() {
    let chain = Arc::new(MockChain::new(500));
    let service = test_service(chain.clone(), fast_commit_config(), CancellationToken::new());

    let summary = service.commit_queued().await.unwrap();
    assert_eq!(summary.success, 0);
    assert!(summary.operation.is_none());
    service.commit_queued().await.unwrap();
    assert_eq!(chain.calls(), 0);
}

#[tokio::test]
async fn test_failed_commit_hands_jobs_back_to_queue() {
    let chain = Arc::new(MockChain::new(500).rejecting_submissions("balance too low"));
    let service = test_service(chain.clone(), fast_commit_config(), CancellationToken::new());
    service.stamp(stamp(1, None)).unwrap();

    let err = service.commit_queued().await.unwrap_err();
    assert!(matches!(err, ServiceError::Commit(CommitError::Submission(_))));

    // The queue owns the retry: the job waits out its backoff there, not in the batch
    assert_eq!(service.queued(), 1);
    assert_eq!(service.orchestrator().pending_len().await, 0);
    let state = service.state(&Digest::new([1; 32])).await.unwrap().unwrap();
    assert_eq!(state.proof.status, ProofStatus::Pending);

    // Still backing off
    let summary = service.commit_queued().await.unwrap();
    assert_eq!(summary.success, 0);
    assert_eq!(chain.submissions().len(), 0);
}

#[tokio::test]
async fn test_concurrent_commits_submit_once() {
    let chain = Arc::new(MockChain::new(500));
    let service = test_service(chain.clone(), fast_commit_config(), CancellationToken::new());
    for byte in 1..=3 {
        service.stamp(stamp(byte, None)).unwrap();
    }

    let (first, second) = tokio::join!(service.commit_queued(), service.commit_queued());
    let mut committed = 0;
    for result in [first, second] {
        match result {
            Ok(summary) => committed += summary.success,
            Err(err) => assert!(matches!(err, ServiceError::Commit(CommitError::CommitInProgress))),
        }
    }
    assert_eq!(committed, 3);
    assert_eq!(chain.submissions().len(), 1);
    assert_eq!(service.queued(), 0);

    // Delivered jobs are not taken again
    let summary = service.commit_queued().await.unwrap();
    assert_eq!(summary.success, 0);
    assert_eq!(chain.submissions().len(), 1);
}

#[tokio::test]
async fn test_commit_is_refused_while_one_is_delivering() {
    let chain = Arc::new(MockChain::new(500));
    let service = Arc::new(test_service(
        chain.clone(),
        CommitConfig {
            poll_interval_ms: 50,
            ..fast_commit_config()
        },
        CancellationToken::new(),
    ));
    service.stamp(stamp(1, None)).unwrap();

    let mut states = service.orchestrator().subscribe();
    let running = {
        let service = service.clone();
        tokio::spawn(async move { service.commit_queued().await })
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == CommitState::AwaitingConfirmations),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(matches!(
        service.commit_queued().await,
        Err(ServiceError::Commit(CommitError::CommitInProgress))
    ));
    assert_eq!(running.await.unwrap().unwrap().success, 1);
    assert_eq!(chain.submissions().len(), 1);
}

#[tokio::test]
async fn test_unknown_hash_has_no_state() {
    let chain = Arc::new(MockChain::new(500));
    let service = test_service(chain, fast_commit_config(), CancellationToken::new());
    assert!(service.state(&Digest::new([9; 32])).await.unwrap().is_none());
}
