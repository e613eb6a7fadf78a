//! Error types for chain stamp trees

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Encoding and decoding failures.
///
/// All of these are deterministic in their input: retrying with the same
/// data reproduces the same error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid digest length: expected {expected}, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("Base58Check decoding failed: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("Prefix mismatch: expected a {expected} value, got {input}")]
    PrefixMismatch { expected: &'static str, input: String },

    #[error("Invalid {kind} payload length: expected {expected}, got {actual}")]
    InvalidPayloadLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Malformed operation group: expected 1 or 2 contents, got {count}")]
    MalformedOperationGroup { count: usize },

    #[error("Unsupported operation kind in group at position {position}")]
    UnsupportedOperationKind { position: usize },

    #[error("Unsupported address: {0}")]
    UnsupportedAddress(String),

    #[error("Unsupported public key: {0}")]
    UnsupportedPublicKey(String),

    #[error("Unsupported signature: {0}")]
    UnsupportedSignature(String),

    #[error("Unsupported transaction parameters: {0}")]
    UnsupportedParameters(String),

    #[error("Invalid numeric field {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Block header is missing field {0}")]
    MissingHeaderField(&'static str),

    #[error("Proof composition mismatch: outer proof starts at {expected}, inner proof derives {actual}")]
    CompositionMismatch { expected: String, actual: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hex encoding error: {0}")]
    HexEncoding(#[from] hex::FromHexError),

    #[error("Proof version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },
}
