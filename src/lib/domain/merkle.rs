use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

use super::commitment::Commitment;
use crate::crypto::mimc::{
    hash_pair,
    zero_leaf,
};

/// Largest supported tree height (2^32 leaves).
pub const MAX_TREE_HEIGHT: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree height {0} outside 1..={MAX_TREE_HEIGHT}")]
    InvalidHeight(usize),

    #[error("tree of height {height} is full ({capacity} leaves)")]
    Full { height: usize, capacity: u64 },

    #[error("leaf index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: u64, len: u64 },
}

/// Inclusion path of one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes from the leaf level up to the root's children.
    pub path_elements: Vec<B256>,
    /// 0 when the node on the path is a left child, 1 when it is a right child.
    pub path_indices: Vec<u8>,
    pub leaf_index: u64,
}

impl MerklePath {
    /// Recompute the root this path commits `leaf` to.
    pub fn compute_root(&self, leaf: B256) -> B256 {
        self.path_elements
            .iter()
            .zip(&self.path_indices)
            .fold(leaf, |node, (sibling, bit)| {
                if *bit == 0 {
                    hash_pair(node, *sibling)
                } else {
                    hash_pair(*sibling, node)
                }
            })
    }

    /// True when the path has one element per level and its direction bits
    /// match `leaf_index`.
    pub fn is_complete(&self, height: usize) -> bool {
        self.path_elements.len() == height
            && self.path_indices.len() == height
            && self
                .path_indices
                .iter()
                .enumerate()
                .all(|(level, bit)| u64::from(*bit) == (self.leaf_index >> level) & 1)
    }
}

/// Fixed-height MiMCSponge Merkle tree with zero-subtree padding.
///
/// Only populated nodes are stored. A node missing from a layer is the root
/// of an empty subtree at that level, whose value is precomputed in `zeros`.
#[derive(Debug, Clone)]
pub struct FixedMerkleTree {
    height: usize,
    /// `zeros[l]` is the root of an empty subtree of height `l`.
    zeros: Vec<B256>,
    /// `layers[0]` holds the leaves, `layers[height]` at most the root.
    layers: Vec<Vec<B256>>,
}

impl FixedMerkleTree {
    pub fn new(height: usize) -> Result<Self, TreeError> {
        if height == 0 || height > MAX_TREE_HEIGHT {
            return Err(TreeError::InvalidHeight(height));
        }

        let mut zeros = Vec::with_capacity(height + 1);
        zeros.push(zero_leaf());
        for level in 0..height {
            let below = zeros[level];
            zeros.push(hash_pair(below, below));
        }

        Ok(Self {
            height,
            zeros,
            layers: vec![Vec::new(); height + 1],
        })
    }

    /// Build a tree from leaves already in index order.
    pub fn from_leaves(
        height: usize,
        leaves: impl IntoIterator<Item = Commitment>,
    ) -> Result<Self, TreeError> {
        let mut tree = Self::new(height)?;
        for leaf in leaves {
            tree.insert(leaf)?;
        }
        Ok(tree)
    }

    /// Append a leaf and return its index.
    pub fn insert(&mut self, leaf: Commitment) -> Result<u64, TreeError> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(TreeError::Full {
                height: self.height,
                capacity: self.capacity(),
            });
        }

        self.layers[0].push(leaf.0);

        let mut position = index as usize;
        for level in 0..self.height {
            let parent = position / 2;
            let left = self.layers[level][parent * 2];
            let right = self.layers[level]
                .get(parent * 2 + 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            let node = hash_pair(left, right);

            let upper = &mut self.layers[level + 1];
            if parent < upper.len() {
                upper[parent] = node;
            } else {
                upper.push(node);
            }
            position = parent;
        }

        Ok(index)
    }

    pub fn root(&self) -> B256 {
        self.layers[self.height]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.height])
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    pub fn leaves(&self) -> &[B256] {
        &self.layers[0]
    }

    /// Index of the first leaf equal to `commitment`.
    pub fn index_of(&self, commitment: &Commitment) -> Option<u64> {
        self.layers[0]
            .iter()
            .position(|leaf| *leaf == commitment.0)
            .map(|i| i as u64)
    }

    pub fn path(&self, index: u64) -> Result<MerklePath, TreeError> {
        if index >= self.len() {
            return Err(TreeError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let mut path_elements = Vec::with_capacity(self.height);
        let mut path_indices = Vec::with_capacity(self.height);
        let mut position = index as usize;
        for level in 0..self.height {
            let sibling = self.layers[level]
                .get(position ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            path_elements.push(sibling);
            path_indices.push((position & 1) as u8);
            position /= 2;
        }

        Ok(MerklePath {
            path_elements,
            path_indices,
            leaf_index: index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> Commitment {
        Commitment(B256::repeat_byte(byte))
    }

    #[test]
    fn test_rejects_invalid_height() {
        assert_eq!(FixedMerkleTree::new(0).unwrap_err(), TreeError::InvalidHeight(0));
        assert_eq!(FixedMerkleTree::new(33).unwrap_err(), TreeError::InvalidHeight(33));
        assert!(FixedMerkleTree::new(32).is_ok());
    }

    #[test]
    fn test_empty_root_is_zero_subtree() {
        let tree = FixedMerkleTree::new(2).unwrap();
        let z0 = zero_leaf();
        let z1 = hash_pair(z0, z0);
        assert_eq!(tree.root(), hash_pair(z1, z1));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_root_matches_manual_computation() {
        let tree = FixedMerkleTree::from_leaves(2, [leaf(1), leaf(2), leaf(3)]).unwrap();
        let z0 = zero_leaf();
        let left = hash_pair(leaf(1).0, leaf(2).0);
        let right = hash_pair(leaf(3).0, z0);
        assert_eq!(tree.root(), hash_pair(left, right));
    }

    #[test]
    fn test_same_leaves_same_root() {
        let a = FixedMerkleTree::from_leaves(4, [leaf(1), leaf(2)]).unwrap();
        let b = FixedMerkleTree::from_leaves(4, [leaf(1), leaf(2)]).unwrap();
        let swapped = FixedMerkleTree::from_leaves(4, [leaf(2), leaf(1)]).unwrap();
        assert_eq!(a.root(), b.root());
        assert_ne!(a.root(), swapped.root());
    }

    #[test]
    fn test_paths_recompute_root_for_every_leaf() {
        let leaves: Vec<_> = (1..=5).map(leaf).collect();
        let tree = FixedMerkleTree::from_leaves(4, leaves.clone()).unwrap();

        for (i, l) in leaves.iter().enumerate() {
            let path = tree.path(i as u64).unwrap();
            assert!(path.is_complete(4));
            assert_eq!(path.compute_root(l.0), tree.root(), "leaf {i}");
        }
    }

    #[test]
    fn test_path_for_wrong_leaf_does_not_match() {
        let tree = FixedMerkleTree::from_leaves(3, [leaf(1), leaf(2)]).unwrap();
        let path = tree.path(0).unwrap();
        assert_ne!(path.compute_root(leaf(9).0), tree.root());
    }

    #[test]
    fn test_tree_full() {
        let mut tree = FixedMerkleTree::new(1).unwrap();
        tree.insert(leaf(1)).unwrap();
        tree.insert(leaf(2)).unwrap();
        assert_eq!(
            tree.insert(leaf(3)).unwrap_err(),
            TreeError::Full {
                height: 1,
                capacity: 2
            }
        );
    }

    #[test]
    fn test_path_out_of_range() {
        let tree = FixedMerkleTree::from_leaves(3, [leaf(1)]).unwrap();
        assert!(matches!(
            tree.path(1),
            Err(TreeError::IndexOutOfRange { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_index_of() {
        let tree = FixedMerkleTree::from_leaves(3, [leaf(1), leaf(2)]).unwrap();
        assert_eq!(tree.index_of(&leaf(2)), Some(1));
        assert_eq!(tree.index_of(&leaf(7)), None);
    }

    #[test]
    fn test_incomplete_path_detected() {
        let tree = FixedMerkleTree::from_leaves(3, [leaf(1), leaf(2)]).unwrap();
        let mut path = tree.path(1).unwrap();
        assert!(path.is_complete(3));
        path.path_indices[0] = 0;
        assert!(!path.is_complete(3));
        path.path_elements.pop();
        assert!(!path.is_complete(3));
    }
}
