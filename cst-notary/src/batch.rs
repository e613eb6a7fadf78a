//! Leaf hashes awaiting commitment

use cst_core::MerkleTree;
use cst_types::LeafHash;
use std::collections::HashSet;

/// Where a hash currently sits in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    InFlight,
}

/// Pending hashes in insertion order, plus the hashes of the commit in flight.
///
/// Digesting does not destroy membership: the digested hashes stay in the
/// in-flight set until the commit completes, and a failed or cancelled commit
/// returns them to the front of the pending list.
#[derive(Debug, Default)]
pub struct CommitBatch {
    pending: Vec<LeafHash>,
    members: HashSet<LeafHash>,
    in_flight: Vec<LeafHash>,
}

impl CommitBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hash. Returns false if it is already pending or in flight.
    pub fn add(&mut self, hash: LeafHash) -> bool {
        if !self.members.insert(hash) {
            return false;
        }
        self.pending.push(hash);
        true
    }

    /// Move up to `limit` pending hashes in flight and build their tree.
    ///
    /// Returns `None` when nothing is pending or a digest is already in flight.
    pub fn digest(&mut self, limit: usize) -> Option<MerkleTree> {
        if self.pending.is_empty() || !self.in_flight.is_empty() {
            return None;
        }
        let take = limit.min(self.pending.len()).max(1);
        self.in_flight = self.pending.drain(..take).collect();
        Some(MerkleTree::from_leaves(self.in_flight.iter().copied()))
    }

    /// The digested hashes are committed; forget them.
    pub fn complete(&mut self) -> Vec<LeafHash> {
        let done = std::mem::take(&mut self.in_flight);
        for hash in &done {
            self.members.remove(hash);
        }
        done
    }

    /// The commit failed; put the digested hashes back in front.
    pub fn restore(&mut self) -> usize {
        let restored = self.in_flight.len();
        let mut pending = std::mem::take(&mut self.in_flight);
        pending.append(&mut self.pending);
        self.pending = pending;
        restored
    }

    /// Drop a pending hash. Hashes in flight cannot be withdrawn.
    pub fn withdraw(&mut self, hash: &LeafHash) -> bool {
        match self.pending.iter().position(|candidate| candidate == hash) {
            Some(index) => {
                self.pending.remove(index);
                self.members.remove(hash);
                true
            }
            None => false,
        }
    }

    pub fn status(&self, hash: &LeafHash) -> Option<BatchStatus> {
        if !self.members.contains(hash) {
            None
        } else if self.in_flight.contains(hash) {
            Some(BatchStatus::InFlight)
        } else {
            Some(BatchStatus::Pending)
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
