//! Proof algebra: replayable transformation steps over a running hash
//!
//! Every segment of a timestamp proof is expressed with two primitives,
//! [`Operation::Join`] and [`Operation::Hash2b`]. A [`Proof`] folds its
//! operations over a start value; proofs chain through [`Proof::prepend_proof`],
//! which refuses to compose two proofs whose hashes do not line up.

use crate::codec::{encode_check, BLOCK_HASH};
use crate::error::{Error, Result};
use crate::primitives::blake2b_256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current version of the serialized proof format.
pub const PROOF_VERSION: u32 = 1;

/// A single proof step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    /// Surround the running value with fixed bytes
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex")]
        prepend: Option<Vec<u8>>,
        #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_hex")]
        append: Option<Vec<u8>>,
    },
    /// Replace the running value with its BLAKE2b-256 digest
    Hash2b,
}

impl Operation {
    pub fn prepend(bytes: impl Into<Vec<u8>>) -> Self {
        Operation::Join {
            prepend: Some(bytes.into()),
            append: None,
        }
    }

    pub fn append(bytes: impl Into<Vec<u8>>) -> Self {
        Operation::Join {
            prepend: None,
            append: Some(bytes.into()),
        }
    }

    /// A join with both sides; empty sides are dropped.
    pub fn join(prepend: Vec<u8>, append: Vec<u8>) -> Self {
        Operation::Join {
            prepend: (!prepend.is_empty()).then_some(prepend),
            append: (!append.is_empty()).then_some(append),
        }
    }

    /// Apply this step to `input`.
    pub fn commit(&self, input: &[u8]) -> Vec<u8> {
        match self {
            Operation::Join { prepend, append } => {
                let prepend = prepend.as_deref().unwrap_or_default();
                let append = append.as_deref().unwrap_or_default();
                let mut out = Vec::with_capacity(prepend.len() + input.len() + append.len());
                out.extend_from_slice(prepend);
                out.extend_from_slice(input);
                out.extend_from_slice(append);
                out
            }
            Operation::Hash2b => blake2b_256(input).to_vec(),
        }
    }
}

/// A start value plus the ordered steps that transform it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub hash: Vec<u8>,
    pub operations: Vec<Operation>,
}

impl Proof {
    pub fn new(hash: impl Into<Vec<u8>>, operations: Vec<Operation>) -> Self {
        Self {
            hash: hash.into(),
            operations,
        }
    }

    /// Fold the operations over the start value.
    pub fn derivation(&self) -> Vec<u8> {
        self.operations
            .iter()
            .fold(self.hash.clone(), |acc, op| op.commit(&acc))
    }

    /// Chain `inner` in front of this proof.
    ///
    /// Valid only when `inner` derives exactly this proof's start value. The
    /// result starts where `inner` starts and runs `inner`'s steps followed by
    /// this proof's steps.
    pub fn prepend_proof(&self, inner: &Proof) -> Result<Proof> {
        let bridge = inner.derivation();
        if bridge != self.hash {
            return Err(Error::CompositionMismatch {
                expected: hex::encode(&self.hash),
                actual: hex::encode(&bridge),
            });
        }
        let mut operations = Vec::with_capacity(inner.operations.len() + self.operations.len());
        operations.extend(inner.operations.iter().cloned());
        operations.extend(self.operations.iter().cloned());
        Ok(Proof {
            hash: inner.hash.clone(),
            operations,
        })
    }
}

/// A proof that terminates at a block hash, with the block's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampProof {
    pub proof: Proof,
    /// Chain identifier the block belongs to
    pub network: String,
    /// Block timestamp as reported by the chain
    pub timestamp: DateTime<Utc>,
    pub level: Option<i32>,
}

impl TimestampProof {
    pub fn new(proof: Proof, network: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            proof,
            network: network.into(),
            timestamp,
            level: None,
        }
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    pub fn start(&self) -> &[u8] {
        &self.proof.hash
    }

    pub fn derivation(&self) -> Vec<u8> {
        self.proof.derivation()
    }

    /// Base58Check block hash this proof derives.
    pub fn block_hash(&self) -> String {
        encode_check(&self.derivation(), &BLOCK_HASH)
    }

    /// Chain `inner` in front, keeping this proof's block metadata.
    pub fn prepend_proof(&self, inner: &Proof) -> Result<TimestampProof> {
        Ok(TimestampProof {
            proof: self.proof.prepend_proof(inner)?,
            network: self.network.clone(),
            timestamp: self.timestamp,
            level: self.level,
        })
    }
}

/// Either kind of proof, as found in a serialized artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyProof {
    Plain(Proof),
    Timestamped(TimestampProof),
}

impl AnyProof {
    pub fn proof(&self) -> &Proof {
        match self {
            AnyProof::Plain(proof) => proof,
            AnyProof::Timestamped(ts) => &ts.proof,
        }
    }

    pub fn derivation(&self) -> Vec<u8> {
        self.proof().derivation()
    }

    pub fn as_timestamp_proof(&self) -> Option<&TimestampProof> {
        match self {
            AnyProof::Timestamped(ts) => Some(ts),
            AnyProof::Plain(_) => None,
        }
    }
}

impl From<Proof> for AnyProof {
    fn from(proof: Proof) -> Self {
        AnyProof::Plain(proof)
    }
}

impl From<TimestampProof> for AnyProof {
    fn from(proof: TimestampProof) -> Self {
        AnyProof::Timestamped(proof)
    }
}

/// The persisted and transmitted proof format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedProof {
    pub version: u32,
    /// Hex-encoded start value
    pub hash: String,
    pub operations: Vec<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
}

impl SerializedProof {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<&Proof> for SerializedProof {
    fn from(proof: &Proof) -> Self {
        Self {
            version: PROOF_VERSION,
            hash: hex::encode(&proof.hash),
            operations: proof.operations.clone(),
            network: None,
            timestamp: None,
            level: None,
        }
    }
}

impl From<&TimestampProof> for SerializedProof {
    fn from(ts: &TimestampProof) -> Self {
        Self {
            network: Some(ts.network.clone()),
            timestamp: Some(ts.timestamp),
            level: ts.level,
            ..SerializedProof::from(&ts.proof)
        }
    }
}

impl From<&AnyProof> for SerializedProof {
    fn from(proof: &AnyProof) -> Self {
        match proof {
            AnyProof::Plain(p) => p.into(),
            AnyProof::Timestamped(ts) => ts.into(),
        }
    }
}

impl TryFrom<SerializedProof> for AnyProof {
    type Error = Error;

    fn try_from(value: SerializedProof) -> Result<Self> {
        if value.version != PROOF_VERSION {
            return Err(Error::VersionMismatch {
                expected: PROOF_VERSION,
                actual: value.version,
            });
        }
        let proof = Proof::new(hex::decode(&value.hash)?, value.operations);
        Ok(match (value.network, value.timestamp) {
            (Some(network), Some(timestamp)) => AnyProof::Timestamped(TimestampProof {
                proof,
                network,
                timestamp,
                level: value.level,
            }),
            _ => AnyProof::Plain(proof),
        })
    }
}

mod opt_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_str(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
