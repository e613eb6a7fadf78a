//! Binary Merkle trees with the chain's list-hashing rule
//!
//! Leaves are hashed before pairing, a level with an odd node count pairs
//! its last node with itself, and the empty tree hashes to `H("")`. The same
//! tree type serves the stamp batch, the per-pass operation trees and the
//! multipass tree, because the latter two are checked bit-for-bit against the
//! block header's `operations_hash`.

use cst_types::{
    messages::{MerkleNode, MerklePath},
    primitives::hash_pair,
    Digest,
};

/// An immutable Merkle tree.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Raw leaf values, in insertion order
    leaves: Vec<Digest>,
    /// levels[0] holds the hashed leaves, the last level holds the root
    levels: Vec<Vec<Digest>>,
    root: Digest,
}

impl MerkleTree {
    /// Build a tree over the given leaves.
    pub fn from_leaves<I>(leaves: I) -> Self
    where
        I: IntoIterator<Item = Digest>,
    {
        let mut builder = MerkleTreeBuilder::new();
        for leaf in leaves {
            builder.append(leaf);
        }
        builder.build()
    }

    /// Root of the empty tree.
    pub fn empty_root() -> Digest {
        Digest::hash(&[])
    }

    pub fn root(&self) -> &Digest {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn leaves(&self) -> &[Digest] {
        &self.leaves
    }

    pub fn get_leaf(&self, index: usize) -> Option<&Digest> {
        self.leaves.get(index)
    }

    /// Position of the first leaf equal to `leaf`.
    pub fn position(&self, leaf: &Digest) -> Option<usize> {
        self.leaves.iter().position(|candidate| candidate == leaf)
    }

    /// Generate the inclusion path for a specific leaf
    pub fn path(&self, leaf_index: usize) -> Option<MerklePath> {
        if leaf_index >= self.leaves.len() {
            return None;
        }

        let mut siblings = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut index = leaf_index;

        // Walk up the tree from leaf to root
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if index % 2 == 0 {
                // Left node; a missing right neighbour means it pairs with itself
                MerkleNode {
                    hash: level.get(index + 1).copied().unwrap_or(level[index]),
                    is_left: false,
                }
            } else {
                MerkleNode {
                    hash: level[index - 1],
                    is_left: true,
                }
            };
            siblings.push(sibling);
            index /= 2;
        }

        Some(MerklePath {
            leaf_index: leaf_index as u64,
            siblings,
        })
    }
}

/// Collects leaves, then freezes them into a [`MerkleTree`].
#[derive(Debug, Default)]
pub struct MerkleTreeBuilder {
    leaves: Vec<Digest>,
}

impl MerkleTreeBuilder {
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            leaves: Vec::with_capacity(capacity),
        }
    }

    /// Add a leaf to the tree
    pub fn append(&mut self, leaf: Digest) {
        self.leaves.push(leaf);
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn build(self) -> MerkleTree {
        if self.leaves.is_empty() {
            return MerkleTree {
                leaves: self.leaves,
                levels: Vec::new(),
                root: MerkleTree::empty_root(),
            };
        }

        // Level 0: leaf hashes
        let mut levels = vec![self
            .leaves
            .iter()
            .map(|leaf| Digest::hash(leaf.as_bytes()))
            .collect::<Vec<_>>()];

        // Build up the tree level by level
        while let Some(prev_level) = levels.last() {
            if prev_level.len() <= 1 {
                break;
            }
            let next_level = prev_level
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [last] => hash_pair(last, last),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next_level);
        }

        let root = levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or_else(MerkleTree::empty_root);

        MerkleTree {
            leaves: self.leaves,
            levels,
            root,
        }
    }
}
