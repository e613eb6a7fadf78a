//! Local proof storage

use cst_types::{AnyProof, Digest, SerializedProof};
use sled::Db;

use crate::{ClientError, Result};

/// Serialized proofs on disk, keyed by the leaf hash they start from
pub struct ProofStorage {
    db: Db,
}

impl ProofStorage {
    /// Open or create storage at the given path
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ClientError::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self { db })
    }

    /// Store a proof
    pub fn store(&self, digest: &Digest, proof: &SerializedProof) -> Result<()> {
        let value = serde_json::to_vec(proof)
            .map_err(|e| ClientError::Storage(format!("Failed to serialize proof: {}", e)))?;

        self.db
            .insert(digest.as_bytes(), value)
            .map_err(|e| ClientError::Storage(format!("Failed to store proof: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| ClientError::Storage(format!("Failed to flush database: {}", e)))?;

        Ok(())
    }

    /// Retrieve a proof
    pub fn get(&self, digest: &Digest) -> Result<Option<SerializedProof>> {
        let value = self
            .db
            .get(digest.as_bytes())
            .map_err(|e| ClientError::Storage(format!("Failed to retrieve proof: {}", e)))?;

        value
            .map(|bytes| {
                serde_json::from_slice(&bytes)
                    .map_err(|e| ClientError::Storage(format!("Failed to deserialize proof: {}", e)))
            })
            .transpose()
    }

    /// List all stored proofs, ordered by leaf hash
    pub fn list(&self) -> Result<Vec<(Digest, SerializedProof)>> {
        let mut proofs = Vec::new();

        for item in self.db.iter() {
            let (key, value) = item
                .map_err(|e| ClientError::Storage(format!("Failed to iterate database: {}", e)))?;

            let digest = Digest::from_slice(&key)
                .map_err(|e| ClientError::Storage(format!("Invalid digest in database: {}", e)))?;

            let proof = serde_json::from_slice(&value)
                .map_err(|e| ClientError::Storage(format!("Failed to deserialize proof: {}", e)))?;

            proofs.push((digest, proof));
        }

        Ok(proofs)
    }

    /// Export a proof as JSON
    pub fn export_json(&self, digest: &Digest) -> Result<String> {
        let proof = self
            .get(digest)?
            .ok_or_else(|| ClientError::Storage(format!("No proof stored for {}", digest)))?;

        proof
            .to_json_pretty()
            .map_err(|e| ClientError::Storage(format!("Failed to serialize proof: {}", e)))
    }

    /// Import a proof from JSON, keyed by its start value
    pub fn import_json(&self, json: &str) -> Result<Digest> {
        let proof = SerializedProof::from_json(json).map_err(|e| ClientError::InvalidProof(e.to_string()))?;

        // Reject anything the proof algebra would not load
        AnyProof::try_from(proof.clone()).map_err(|e| ClientError::InvalidProof(e.to_string()))?;
        let digest = Digest::from_hex(&proof.hash).map_err(|e| ClientError::InvalidProof(e.to_string()))?;

        self.store(&digest, &proof)?;
        Ok(digest)
    }
}
