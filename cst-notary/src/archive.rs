//! Archival store for issued proofs

use chrono::Utc;
use cst_types::messages::{ArchivalFileState, ArchiveMetadata, ArchivedFile};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::path::Path;
use thiserror::Error;

pub const PROOF_CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Corrupt archive record {name}: {source}")]
    Corrupt {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Handle to an archived artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    pub name: String,
    pub state: ArchivalFileState,
}

/// Named, write-once-per-name artifact storage.
pub trait Archive: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous artifact.
    fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<StorageRef, ArchiveError>;

    fn exists(&self, name: &str) -> Result<Option<StorageRef>, ArchiveError>;

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, ArchiveError>;
}

/// Archive name of the proof for a leaf hash.
pub fn proof_name(stem: &str) -> String {
    format!("{}.proof.json", stem)
}

/// [`Archive`] backed by two sled trees: artifact bytes and their metadata.
pub struct SledArchive {
    db: sled::Db,
    files: sled::Tree,
    states: sled::Tree,
}

impl SledArchive {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        Self::from_db(sled::open(path)?)
    }

    /// An archive that disappears when dropped.
    pub fn temporary() -> Result<Self, ArchiveError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    pub fn from_db(db: sled::Db) -> Result<Self, ArchiveError> {
        let files = db.open_tree("files")?;
        let states = db.open_tree("states")?;
        Ok(Self { db, files, states })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Archive for SledArchive {
    fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<StorageRef, ArchiveError> {
        let state = ArchivalFileState {
            file: ArchivedFile {
                filename: name.to_string(),
                content_type: content_type.to_string(),
            },
            metadata: ArchiveMetadata {
                archived_at: Utc::now(),
                size: bytes.len() as u64,
                sha256_hash: hex::encode(Sha256::digest(bytes)),
            },
        };
        let encoded = serde_json::to_vec(&state).map_err(|source| ArchiveError::Corrupt {
            name: name.to_string(),
            source,
        })?;

        self.files.insert(name.as_bytes(), bytes)?;
        self.states.insert(name.as_bytes(), encoded)?;
        self.db.flush()?;

        Ok(StorageRef {
            name: name.to_string(),
            state,
        })
    }

    fn exists(&self, name: &str) -> Result<Option<StorageRef>, ArchiveError> {
        match self.states.get(name.as_bytes())? {
            Some(bytes) => {
                let state = serde_json::from_slice(&bytes).map_err(|source| ArchiveError::Corrupt {
                    name: name.to_string(),
                    source,
                })?;
                Ok(Some(StorageRef {
                    name: name.to_string(),
                    state,
                }))
            }
            None => Ok(None),
        }
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
        Ok(self.files.get(name.as_bytes())?.map(|bytes| bytes.to_vec()))
    }
}
