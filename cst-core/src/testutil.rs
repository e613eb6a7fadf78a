//! Synthetic, self-consistent blocks for tests.
//!
//! Enabled via the `test-util` feature flag. Every hash in a synthetic block
//! (operation hashes, `operations_hash`, block hash) is computed with this
//! crate's own encoders, so the blocks are only as trustworthy as those
//! encoders; the fixtures under `tests/fixtures/` carry hashes computed
//! outside this crate and are the independent check.

use crate::forge::forge_operation_group;
use crate::header::split_header;
use crate::merkle::MerkleTree;
use chrono::{DateTime, Utc};
use cst_types::block::{
    BlockData, BlockHeader, OperationContent, OperationEntry, Parameters, TransactionContent,
};
use cst_types::codec::{
    decode_check, decode_signature, encode_check, BLOCK_HASH, CONTEXT_HASH, CONTRACT_HASH,
    ED25519_PUBLIC_KEY_HASH, GENERIC_SIGNATURE, OPERATION_HASH, OPERATION_LIST_LIST_HASH, PAYLOAD_HASH,
};
use cst_types::{blake2b_256, Digest};

/// Ithaca protocol used for synthetic headers.
pub const SYNTHETIC_PROTOCOL: &str = "Psithaca2MLRFYargivpo7YvUr7wUDqyxrdhC5CQq78mRvimz6A";
pub const SYNTHETIC_CHAIN_ID: &str = "NetXdQprcVkpaWU";

/// Deterministic filler bytes derived from a label and a counter.
pub fn filler(label: &str, n: u64) -> [u8; 32] {
    blake2b_256(format!("{}:{}", label, n).as_bytes())
}

fn filler_signature(label: &str, n: u64) -> String {
    let mut sig = filler(label, n).to_vec();
    sig.extend_from_slice(&filler(label, n + 1));
    encode_check(&sig, &GENERIC_SIGNATURE)
}

/// The commitment contract used by synthetic operations.
pub fn contract_address() -> String {
    encode_check(&filler("contract", 0)[..20], &CONTRACT_HASH)
}

/// A signed commitment transaction carrying `root`, with its hash computed.
pub fn commitment_operation(root: &Digest, counter: u64) -> OperationEntry {
    let source = encode_check(&filler("source", 0)[..20], &ED25519_PUBLIC_KEY_HASH);
    let tx = TransactionContent {
        source,
        fee: "1420".into(),
        counter: counter.to_string(),
        gas_limit: "1527".into(),
        storage_limit: "0".into(),
        amount: "0".into(),
        destination: contract_address(),
        parameters: Some(Parameters {
            entrypoint: "default".into(),
            value: serde_json::json!({ "bytes": root.to_hex() }),
        }),
    };
    sign_operation(vec![OperationContent::Transaction(tx)], counter)
}

fn sign_operation(contents: Vec<OperationContent>, n: u64) -> OperationEntry {
    let mut entry = OperationEntry {
        hash: String::new(),
        branch: encode_check(&filler("branch", n), &BLOCK_HASH),
        contents,
        signature: Some(filler_signature("op-signature", n)),
    };
    let mut bytes = forge_operation_group(&entry).expect("synthetic operation forges");
    bytes.extend(decode_signature(entry.signature.as_deref().unwrap_or_default()).expect("valid signature"));
    entry.hash = encode_check(&blake2b_256(&bytes), &OPERATION_HASH);
    entry
}

/// An unrelated operation, hashed arbitrarily.
pub fn foreign_operation(n: u64) -> OperationEntry {
    OperationEntry {
        hash: encode_check(&filler("foreign-op", n), &OPERATION_HASH),
        branch: encode_check(&filler("branch", n), &BLOCK_HASH),
        contents: vec![OperationContent::Other],
        signature: Some(filler_signature("foreign-signature", n)),
    }
}

/// Build a block at `level` whose manager pass holds `manager_ops`.
///
/// Pass 0 holds one foreign operation and passes 1 and 2 are empty.
pub fn block_at(level: i32, timestamp: DateTime<Utc>, manager_ops: Vec<OperationEntry>) -> BlockData {
    let n = level as u64;
    let operations = vec![vec![foreign_operation(n)], vec![], vec![], manager_ops];

    let pass_roots = operations.iter().map(|pass| {
        let hashes = pass.iter().map(|entry| {
            Digest::from_slice(&decode_check(&entry.hash, &OPERATION_HASH).expect("operation hash"))
                .expect("32-byte operation hash")
        });
        *MerkleTree::from_leaves(hashes).root()
    });
    let operations_hash = *MerkleTree::from_leaves(pass_roots.collect::<Vec<_>>()).root();

    let header = BlockHeader {
        level,
        proto: 12,
        predecessor: encode_check(&filler("block", n.saturating_sub(1)), &BLOCK_HASH),
        timestamp,
        validation_pass: 4,
        operations_hash: encode_check(operations_hash.as_bytes(), &OPERATION_LIST_LIST_HASH),
        fitness: vec!["02".into(), format!("{:08x}", level), String::new(), "ffffffff".into(), "00000000".into()],
        context: encode_check(&filler("context", n), &CONTEXT_HASH),
        priority: None,
        payload_hash: Some(encode_check(&filler("payload", n), &PAYLOAD_HASH)),
        payload_round: Some(0),
        proof_of_work_nonce: "e5e9d5d60a0b0000".into(),
        seed_nonce_hash: None,
        liquidity_baking_escape_vote: Some(false),
        liquidity_baking_toggle_vote: None,
        signature: filler_signature("block-signature", n),
    };

    let mut block = BlockData {
        protocol: SYNTHETIC_PROTOCOL.into(),
        chain_id: SYNTHETIC_CHAIN_ID.into(),
        hash: String::new(),
        header,
        operations,
    };

    let split = split_header(&block).expect("synthetic header encodes");
    let mut bytes = split.prepend;
    bytes.extend_from_slice(operations_hash.as_bytes());
    bytes.extend(split.append);
    block.hash = encode_check(&blake2b_256(&bytes), &BLOCK_HASH);
    block
}
