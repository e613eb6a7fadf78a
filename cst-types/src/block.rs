//! Block data as reported by a chain node's RPC
//!
//! Only the fields the proof builders read are modelled; everything else in
//! the node's JSON is ignored on deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of validation passes a block partitions its operations into.
pub const VALIDATION_PASSES: usize = 4;

/// Index of the manager-operations pass, where commitment transactions land.
pub const MANAGER_PASS: usize = 3;

/// A full block: header plus per-pass operation lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockData {
    /// Base58 protocol hash the block was produced under
    pub protocol: String,
    /// Base58 chain identifier (`Net...`)
    pub chain_id: String,
    /// Base58 block hash (`B...`)
    pub hash: String,
    pub header: BlockHeader,
    /// Operation lists, one per validation pass
    #[serde(default)]
    pub operations: Vec<Vec<OperationEntry>>,
}

impl BlockData {
    /// Find an operation group by its Base58 hash within one validation pass.
    pub fn find_operation(&self, pass: usize, operation_hash: &str) -> Option<&OperationEntry> {
        self.operations
            .get(pass)
            .and_then(|entries| entries.iter().find(|entry| entry.hash == operation_hash))
    }

    /// True if the operation group appears in the manager pass.
    pub fn contains_operation(&self, operation_hash: &str) -> bool {
        self.find_operation(MANAGER_PASS, operation_hash).is_some()
    }
}

/// Shell and protocol header fields.
///
/// Fields that only exist in one header era are optional here; the header
/// encoder decides which ones it requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    pub level: i32,
    pub proto: u8,
    pub predecessor: String,
    pub timestamp: DateTime<Utc>,
    pub validation_pass: u8,
    pub operations_hash: String,
    pub fitness: Vec<String>,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_round: Option<i32>,
    pub proof_of_work_nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_nonce_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_baking_escape_vote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity_baking_toggle_vote: Option<ToggleVote>,
    pub signature: String,
}

/// Liquidity baking toggle vote carried by Jakarta headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleVote {
    On,
    Off,
    Pass,
}

impl ToggleVote {
    /// Single-byte tag used in the binary header.
    pub fn tag(self) -> u8 {
        match self {
            ToggleVote::On => 0x00,
            ToggleVote::Off => 0x01,
            ToggleVote::Pass => 0x02,
        }
    }
}

/// The subset of a header a verifier needs.
///
/// The node's header endpoint returns the header fields flattened together
/// with `hash`, `chain_id` and `protocol`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSummary {
    pub hash: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    pub level: i32,
    pub timestamp: DateTime<Utc>,
}

impl From<&BlockData> for HeaderSummary {
    fn from(block: &BlockData) -> Self {
        Self {
            hash: block.hash.clone(),
            chain_id: Some(block.chain_id.clone()),
            protocol: Some(block.protocol.clone()),
            level: block.header.level,
            timestamp: block.header.timestamp,
        }
    }
}

/// One operation group inside a validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEntry {
    /// Base58 operation hash (`o...`)
    pub hash: String,
    /// Base58 block hash the operation was forged against
    pub branch: String,
    pub contents: Vec<OperationContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Operation contents, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationContent {
    Reveal(RevealContent),
    Transaction(TransactionContent),
    /// Any kind the encoder does not forge (endorsements, originations, ...)
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealContent {
    pub source: String,
    pub fee: String,
    pub counter: String,
    pub gas_limit: String,
    pub storage_limit: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionContent {
    pub source: String,
    pub fee: String,
    pub counter: String,
    pub gas_limit: String,
    pub storage_limit: String,
    pub amount: String,
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
}

/// Contract call parameters: entrypoint name and a Micheline JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub entrypoint: String,
    pub value: serde_json::Value,
}
