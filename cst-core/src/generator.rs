//! Proof segments from a batch leaf up to a block hash
//!
//! A full proof is built from four segments, each a [`Proof`] that ends where
//! the next one starts:
//!
//! 1. inclusion: leaf to batch root, from the batch Merkle tree
//! 2. operation group: batch root to the operation hash, by splitting the
//!    forged operation around the embedded root
//! 3. operations index: operation hash to the header's `operations_hash`,
//!    through the manager pass tree and the multipass tree
//! 4. block header: `operations_hash` to the block hash
//!
//! Segments 2 to 4 depend only on the block and are built once per commit;
//! segment 1 is prepended per leaf.

use crate::error::{ProofError, Result};
use crate::forge::forge_operation_group;
use crate::header::{split_header, HeaderEra};
use crate::merkle::MerkleTree;
use cst_types::block::{BlockData, MANAGER_PASS, VALIDATION_PASSES};
use cst_types::codec::{
    decode_check, decode_signature, find_unique, Prefix, BLOCK_HASH, OPERATION_HASH,
    OPERATION_LIST_LIST_HASH,
};
use cst_types::messages::MerklePath;
use cst_types::{Digest, LeafHash, Operation, Proof, TimestampProof};
use rayon::prelude::*;
use tracing::debug;

/// Translate a Merkle path into proof steps starting at the raw leaf.
pub fn path_to_proof(leaf: &Digest, path: &MerklePath) -> Proof {
    let mut operations = Vec::with_capacity(1 + 2 * path.siblings.len());
    operations.push(Operation::Hash2b);
    for sibling in &path.siblings {
        operations.push(if sibling.is_left {
            Operation::prepend(sibling.hash.to_vec())
        } else {
            Operation::append(sibling.hash.to_vec())
        });
        operations.push(Operation::Hash2b);
    }
    Proof::new(leaf.to_vec(), operations)
}

/// Inclusion proof for the leaf at `index`, deriving the tree root.
pub fn inclusion_proof(tree: &MerkleTree, index: usize) -> Result<Proof> {
    let out_of_range = || ProofError::LeafOutOfRange {
        index,
        leaves: tree.leaf_count(),
    };
    let leaf = tree.get_leaf(index).ok_or_else(out_of_range)?;
    let path = tree.path(index).ok_or_else(out_of_range)?;
    Ok(path_to_proof(leaf, &path))
}

fn raw_hash(encoded: &str, prefix: &Prefix) -> Result<Digest> {
    Ok(Digest::from_slice(&decode_check(encoded, prefix)?)?)
}

fn check_derivation(segment: &'static str, proof: &Proof, expected: &Digest) -> Result<()> {
    let derived = proof.derivation();
    if derived.as_slice() != expected.as_bytes() {
        return Err(ProofError::DerivationMismatch {
            segment,
            expected: expected.to_hex(),
            actual: hex::encode(derived),
        });
    }
    Ok(())
}

/// Builds proof segments against one fetched block.
#[derive(Debug, Clone, Copy)]
pub struct ProofGenerator<'a> {
    block: &'a BlockData,
    era: HeaderEra,
}

impl<'a> ProofGenerator<'a> {
    /// Fails with `UnsupportedProtocol` if the block's header layout is unknown.
    pub fn new(block: &'a BlockData) -> Result<Self> {
        let era = HeaderEra::for_protocol(&block.protocol)?;
        Ok(Self { block, era })
    }

    pub fn era(&self) -> HeaderEra {
        self.era
    }

    /// Batch root to operation hash.
    pub fn op_group_proof(&self, operation_hash: &str, root: &Digest) -> Result<Proof> {
        let entry = self
            .block
            .find_operation(MANAGER_PASS, operation_hash)
            .ok_or_else(|| ProofError::OperationNotFound {
                operation: operation_hash.to_string(),
                pass: MANAGER_PASS,
            })?;

        let forged = forge_operation_group(entry)?;
        let offset = match find_unique(&forged, root.as_bytes()) {
            (Some(offset), 1) => offset,
            (_, 0) => {
                return Err(ProofError::RootHashNotEmbedded {
                    operation: operation_hash.to_string(),
                })
            }
            (_, occurrences) => {
                return Err(ProofError::RootHashAmbiguous {
                    operation: operation_hash.to_string(),
                    occurrences,
                })
            }
        };

        let signature = entry
            .signature
            .as_deref()
            .ok_or_else(|| ProofError::SignatureMissing {
                operation: operation_hash.to_string(),
            })?;

        let prepend = forged[..offset].to_vec();
        let mut append = forged[offset + Digest::LEN..].to_vec();
        append.extend(decode_signature(signature)?);

        let proof = Proof::new(root.to_vec(), vec![Operation::join(prepend, append), Operation::Hash2b]);
        check_derivation("operation group", &proof, &raw_hash(operation_hash, &OPERATION_HASH)?)?;
        Ok(proof)
    }

    /// One tree per validation pass over the raw operation hashes.
    ///
    /// Passes the node omitted are treated as empty.
    pub fn pass_trees(&self) -> Result<Vec<MerkleTree>> {
        (0..VALIDATION_PASSES)
            .map(|pass| {
                let entries = self.block.operations.get(pass).map(Vec::as_slice).unwrap_or_default();
                let hashes = entries
                    .iter()
                    .map(|entry| raw_hash(&entry.hash, &OPERATION_HASH))
                    .collect::<Result<Vec<_>>>()?;
                Ok(MerkleTree::from_leaves(hashes))
            })
            .collect()
    }

    /// Operation hash to the header's `operations_hash`.
    pub fn ops_hash_proof(&self, operation_hash: &str) -> Result<Proof> {
        let trees = self.pass_trees()?;
        let manager = &trees[MANAGER_PASS];

        let target = raw_hash(operation_hash, &OPERATION_HASH)?;
        let index = manager
            .position(&target)
            .ok_or_else(|| ProofError::OperationNotFound {
                operation: operation_hash.to_string(),
                pass: MANAGER_PASS,
            })?;
        let pass_proof = inclusion_proof(manager, index)?;

        let multipass = MerkleTree::from_leaves(trees.iter().map(|tree| *tree.root()));
        let multipass_proof = inclusion_proof(&multipass, MANAGER_PASS)?;

        let proof = multipass_proof.prepend_proof(&pass_proof)?;
        check_derivation(
            "operations index",
            &proof,
            &raw_hash(&self.block.header.operations_hash, &OPERATION_LIST_LIST_HASH)?,
        )?;
        Ok(proof)
    }

    /// `operations_hash` to the block hash.
    pub fn block_header_proof(&self) -> Result<TimestampProof> {
        let header = &self.block.header;
        let split = split_header(self.block)?;
        let start = raw_hash(&header.operations_hash, &OPERATION_LIST_LIST_HASH)?;

        let proof = Proof::new(
            start.to_vec(),
            vec![Operation::join(split.prepend, split.append), Operation::Hash2b],
        );
        check_derivation("block header", &proof, &raw_hash(&self.block.hash, &BLOCK_HASH)?)?;

        Ok(TimestampProof::new(proof, self.block.chain_id.clone(), header.timestamp).with_level(header.level))
    }

    /// Batch root to block hash: segments 2 to 4 composed.
    pub fn block_proof(&self, operation_hash: &str, root: &Digest) -> Result<TimestampProof> {
        let op_group = self.op_group_proof(operation_hash, root)?;
        let ops_hash = self.ops_hash_proof(operation_hash)?;
        let header = self.block_header_proof()?;

        let proof = header.prepend_proof(&ops_hash.prepend_proof(&op_group)?)?;
        debug!(
            operation = operation_hash,
            level = self.block.header.level,
            block = %self.block.hash,
            "built block proof"
        );
        Ok(proof)
    }
}

/// Prepend each leaf's inclusion segment to the shared block proof.
///
/// Leaves are processed in parallel. Any failure fails the whole batch.
pub fn leaf_proofs(tree: &MerkleTree, block_proof: &TimestampProof) -> Result<Vec<(LeafHash, TimestampProof)>> {
    (0..tree.leaf_count())
        .into_par_iter()
        .map(|index| {
            let inclusion = inclusion_proof(tree, index)?;
            let full = block_proof.prepend_proof(&inclusion)?;
            Ok((tree.leaves()[index], full))
        })
        .collect()
}
