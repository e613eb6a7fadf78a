//! The CLI's client library against an in-process notary.

use cst_client::{leaf_hash, timestamp_proof, ClientError, NotaryClient, ProofStorage};
use cst_core::verify_leaf;
use cst_notary::testutil::TestServer;
use cst_types::{ProofStatus, StampRequest};

#[tokio::test]
async fn test_stamp_commit_fetch_and_verify() {
    let server = TestServer::start().await;
    let client = NotaryClient::new(server.url());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    std::fs::write(&path, b"quarterly numbers").unwrap();

    let (hash, response) = client.stamp_file(&path, None, vec![]).await.unwrap();
    assert_eq!(response.proof.status, ProofStatus::Pending);
    assert_eq!(client.health().await.unwrap().queued, 1);

    let summary = client.commit().await.unwrap();
    assert_eq!(summary.success, 1);

    let state = client.state(&hash).await.unwrap().unwrap();
    assert_eq!(state.proof.status, ProofStatus::Committed);
    let serialized = state.proof.proof.unwrap();
    let proof = timestamp_proof(serialized.clone()).unwrap();

    verify_leaf(&proof, &leaf_hash(b"quarterly numbers")).unwrap();
    let header = client.verify(&proof, server.chain().as_ref()).await.unwrap();
    assert_eq!(Some(header.hash), summary.block_hash);
    assert_eq!(Some(header.level), summary.level);

    // The proof survives a trip through local storage
    let storage = ProofStorage::open(&dir.path().join("store")).unwrap();
    storage.store(&hash, &serialized).unwrap();
    let exported = storage.export_json(&hash).unwrap();
    assert_eq!(cst_client::load_timestamp_proof(&exported).unwrap(), proof);
}

#[tokio::test]
async fn test_restamping_returns_committed_proof() {
    let server = TestServer::start().await;
    let client = NotaryClient::new(server.url());
    let request = StampRequest {
        hash: leaf_hash(b"once"),
        file_id: None,
        webhooks: vec![],
    };

    client.stamp(&request).await.unwrap();
    client.commit().await.unwrap();

    let again = client.stamp(&request).await.unwrap();
    assert_eq!(again.proof.status, ProofStatus::Committed);
    assert!(again.proof.proof.is_some());
    assert_eq!(server.chain().submissions().len(), 1);
}

#[tokio::test]
async fn test_unknown_hash_and_shutdown() {
    let server = TestServer::start().await;
    let client = NotaryClient::new(server.url());

    assert!(client.state(&leaf_hash(b"never")).await.unwrap().is_none());

    let empty = client.commit().await.unwrap();
    assert_eq!(empty.success, 0);

    server.shutdown();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let err = NotaryClient::new(server.url()).health().await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_) | ClientError::Timeout));
}
