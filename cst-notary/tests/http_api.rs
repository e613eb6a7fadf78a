//! HTTP surface of an in-process notary.

use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use cst_notary::testutil::TestServer;
use cst_types::messages::ErrorResponse;
use cst_types::{
    AnyProof, CommitSummary, Digest, ProofStatus, StampRequest, StampResponse, StateResponse, WebhookPayload,
};
use tokio::sync::mpsc;

fn request(byte: u8, webhooks: Vec<String>) -> StampRequest {
    StampRequest {
        hash: Digest::new([byte; 32]),
        file_id: Some(format!("file-{}", byte)),
        webhooks,
    }
}

async fn state(client: &reqwest::Client, server: &TestServer, hash: &Digest) -> reqwest::Response {
    client
        .get(format!("{}/api/state/{}", server.url(), hash.to_hex()))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_stamp_commit_and_query() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let hash = Digest::new([7; 32]);

    let response: StampResponse = client
        .post(format!("{}/api/stamp", server.url()))
        .json(&request(7, vec![]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response, StampResponse::pending());

    let pending: StateResponse = state(&client, &server, &hash).await.json().await.unwrap();
    assert_eq!(pending.proof.status, ProofStatus::Pending);

    let summary: CommitSummary = client
        .post(format!("{}/api/commit", server.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary.success, 1);
    assert!(summary.operation.is_some());
    assert_eq!(server.chain().submissions().len(), 1);

    let committed: StateResponse = state(&client, &server, &hash).await.json().await.unwrap();
    assert_eq!(committed.proof.status, ProofStatus::Committed);
    assert!(committed.file.is_some());

    let proof = AnyProof::try_from(committed.proof.proof.unwrap()).unwrap();
    let proof = proof.as_timestamp_proof().unwrap();
    assert_eq!(proof.start(), hash.as_bytes());
    assert_eq!(Some(proof.block_hash()), summary.block_hash);
}

#[tokio::test]
async fn test_state_errors() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let unknown = state(&client, &server, &Digest::new([1; 32])).await;
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

    let malformed = client
        .get(format!("{}/api/state/not-hex", server.url()))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorResponse = malformed.json().await.unwrap();
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let body: serde_json::Value = reqwest::get(format!("{}/health", server.url()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["commit_state"], "idle");
}

#[tokio::test]
async fn test_webhook_receives_committed_proof() {
    let (tx, mut rx) = mpsc::unbounded_channel::<WebhookPayload>();
    let receiver = Router::new()
        .route(
            "/hook",
            post(
                |State(tx): State<mpsc::UnboundedSender<WebhookPayload>>, Json(payload): Json<WebhookPayload>| async move {
                    tx.send(payload).ok();
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .with_state(tx);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let hook = format!("http://{}/hook", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, receiver).await.unwrap();
    });

    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    client
        .post(format!("{}/api/stamp", server.url()))
        .json(&request(3, vec![hook]))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/api/commit", server.url()))
        .send()
        .await
        .unwrap();

    let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload.hash, Digest::new([3; 32]));
    assert_eq!(payload.file_id.as_deref(), Some("file-3"));
    assert_eq!(payload.proof.hash, Digest::new([3; 32]).to_hex());
}
