//! Commitment Accumulator
//!
//! Append-only, fixed-height Merkle tree over Poseidon. Two shapes live here:
//!
//! - [`Accumulator`]: the authoritative incremental tree. Keeps only the
//!   left-hand frontier (`subtrees`) plus a ring buffer of recent roots, so
//!   it can be persisted in a single ledger slot.
//! - [`MerkleTree`]: a full layered tree that keeps every node and can serve
//!   membership paths. The mirror service uses it.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               L0  L1 L2   zero[0]
//! ```
//!
//! The tree fills strictly left to right, so every missing node on the right
//! is the precomputed empty subtree for its level.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use crate::error::{PrivacyError, Result};
use crate::poseidon::hasher;

/// Height used by pools unless configured otherwise
pub const DEFAULT_HEIGHT: usize = 26;
/// Number of recent roots accepted by `is_known_root`
pub const ROOT_HISTORY_SIZE: usize = 100;
/// Largest supported height (zero hashes are precomputed up to here)
pub const MAX_HEIGHT: usize = 32;

/// The empty leaf
pub const EMPTY_LEAF: [u8; 32] = [0u8; 32];

static ZERO_HASHES: OnceLock<Vec<[u8; 32]>> = OnceLock::new();

/// Empty subtree roots: `zero[0]` is the empty leaf and
/// `zero[l] = H(zero[l-1], zero[l-1])`. Length `MAX_HEIGHT + 1`.
pub fn zero_hashes() -> &'static [[u8; 32]] {
    ZERO_HASHES.get_or_init(|| {
        let mut zeros = Vec::with_capacity(MAX_HEIGHT + 1);
        zeros.push(EMPTY_LEAF);
        for level in 1..=MAX_HEIGHT {
            let prev = zeros[level - 1];
            zeros.push(hasher().hash_pair(&prev, &prev));
        }
        zeros
    })
}

fn check_height(height: usize) -> Result<()> {
    if height == 0 || height > MAX_HEIGHT {
        return Err(PrivacyError::InvalidHeight(height));
    }
    Ok(())
}

fn capacity_of(height: usize) -> u64 {
    1u64 << height
}

// ============================================================================
// Membership paths
// ============================================================================

/// A Merkle path proving inclusion of a leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<[u8; 32]>,
    /// Position bits (false = node is the left child, true = right)
    pub path_bits: Vec<bool>,
    /// The leaf position
    pub index: u64,
}

impl MerklePath {
    /// Fold the path over `leaf`
    pub fn compute_root(&self, leaf: &[u8; 32]) -> [u8; 32] {
        let h = hasher();
        let mut current = *leaf;
        for (sibling, is_right) in self.siblings.iter().zip(&self.path_bits) {
            current = if *is_right {
                h.hash_pair(sibling, &current)
            } else {
                h.hash_pair(&current, sibling)
            };
        }
        current
    }

    /// Verify that this path proves inclusion of `leaf` in `root`
    pub fn verify(&self, leaf: &[u8; 32], root: &[u8; 32]) -> bool {
        &self.compute_root(leaf) == root
    }

    /// Path used for dummy inputs with no real membership
    pub fn empty(height: usize) -> Result<Self> {
        check_height(height)?;
        Ok(Self {
            siblings: zero_hashes()[..height].to_vec(),
            path_bits: vec![false; height],
            index: 0,
        })
    }
}

/// Reference root: hash the full leaf list layer by layer, padding each odd
/// layer with the empty subtree of that level.
pub fn compute_root(leaves: &[[u8; 32]], height: usize) -> Result<[u8; 32]> {
    check_height(height)?;
    if leaves.len() as u64 > capacity_of(height) {
        return Err(PrivacyError::TreeFull {
            capacity: capacity_of(height),
        });
    }

    let zeros = zero_hashes();
    let h = hasher();
    let mut layer = leaves.to_vec();
    for zero in zeros.iter().take(height) {
        layer = layer
            .chunks(2)
            .map(|pair| h.hash_pair(&pair[0], pair.get(1).unwrap_or(zero)))
            .collect();
    }
    Ok(layer.first().copied().unwrap_or(zeros[height]))
}

// ============================================================================
// Incremental accumulator
// ============================================================================

/// Persisted accumulator record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
pub struct AccumulatorState {
    pub height: u32,
    /// Leaves inserted so far
    pub next_index: u64,
    /// Cached left-hand node per level
    pub subtrees: Vec<[u8; 32]>,
    pub root: [u8; 32],
    /// Ring buffer of recent roots; `root_history[root_index] == root`
    pub root_history: Vec<[u8; 32]>,
    pub root_index: u64,
}

/// Incremental Merkle tree with a bounded root history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulator {
    state: AccumulatorState,
}

impl Accumulator {
    /// Create an empty accumulator
    pub fn new(height: usize, history_size: usize) -> Result<Self> {
        check_height(height)?;
        if history_size == 0 {
            return Err(PrivacyError::InvalidHistorySize);
        }

        let zeros = zero_hashes();
        let root = zeros[height];
        let mut root_history = vec![[0u8; 32]; history_size];
        root_history[0] = root;

        Ok(Self {
            state: AccumulatorState {
                height: height as u32,
                next_index: 0,
                subtrees: zeros[..height].to_vec(),
                root,
                root_history,
                root_index: 0,
            },
        })
    }

    /// Restore from a persisted record, rejecting inconsistent shapes
    pub fn from_state(state: AccumulatorState) -> Result<Self> {
        let height = state.height as usize;
        check_height(height)?;
        if state.subtrees.len() != height {
            return Err(PrivacyError::CorruptState("subtree count != height"));
        }
        if state.root_history.is_empty() {
            return Err(PrivacyError::InvalidHistorySize);
        }
        if state.root_index >= state.root_history.len() as u64 {
            return Err(PrivacyError::CorruptState("root index out of range"));
        }
        if state.root_history[state.root_index as usize] != state.root {
            return Err(PrivacyError::CorruptState("root not at root index"));
        }
        if state.next_index > capacity_of(height) {
            return Err(PrivacyError::CorruptState("next index beyond capacity"));
        }
        Ok(Self { state })
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    pub fn into_state(self) -> AccumulatorState {
        self.state
    }

    pub fn height(&self) -> usize {
        self.state.height as usize
    }

    /// Maximum number of leaves
    pub fn capacity(&self) -> u64 {
        capacity_of(self.height())
    }

    pub fn next_index(&self) -> u64 {
        self.state.next_index
    }

    pub fn root(&self) -> [u8; 32] {
        self.state.root
    }

    pub fn root_history(&self) -> &[[u8; 32]] {
        &self.state.root_history
    }

    /// Append a leaf and return its index
    pub fn insert(&mut self, leaf: [u8; 32]) -> Result<u64> {
        if self.state.next_index >= self.capacity() {
            return Err(PrivacyError::TreeFull {
                capacity: self.capacity(),
            });
        }

        let zeros = zero_hashes();
        let h = hasher();
        let index = self.state.next_index;
        let mut current_index = index;
        let mut current = leaf;

        for (level, subtree) in self.state.subtrees.iter_mut().enumerate() {
            let (left, right) = if current_index % 2 == 0 {
                *subtree = current;
                (current, zeros[level])
            } else {
                (*subtree, current)
            };
            current = h.hash_pair(&left, &right);
            current_index /= 2;
        }

        let history = self.state.root_history.len() as u64;
        self.state.root = current;
        self.state.root_index = (self.state.root_index + 1) % history;
        self.state.root_history[self.state.root_index as usize] = current;
        self.state.next_index = index + 1;

        Ok(index)
    }

    /// Append two leaves. Capacity is checked for both before either lands.
    pub fn insert_pair(&mut self, first: [u8; 32], second: [u8; 32]) -> Result<[u64; 2]> {
        if self.state.next_index + 2 > self.capacity() {
            return Err(PrivacyError::TreeFull {
                capacity: self.capacity(),
            });
        }
        Ok([self.insert(first)?, self.insert(second)?])
    }

    /// True if `root` is the current root or still in the history window.
    /// The all-zero root is never accepted.
    pub fn is_known_root(&self, root: &[u8; 32]) -> bool {
        if *root == [0u8; 32] {
            return false;
        }

        let history = &self.state.root_history;
        let start = self.state.root_index as usize;
        let mut i = start;
        loop {
            if history[i] == *root {
                return true;
            }
            i = if i == 0 { history.len() - 1 } else { i - 1 };
            if i == start {
                return false;
            }
        }
    }
}

// ============================================================================
// Full layered tree
// ============================================================================

/// Merkle tree that keeps every node, for serving membership paths
#[derive(Debug, Clone)]
pub struct MerkleTree {
    height: usize,
    /// `layers[0]` are the leaves, `layers[height]` holds the root once non-empty
    layers: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    pub fn new(height: usize) -> Result<Self> {
        check_height(height)?;
        Ok(Self {
            height,
            layers: vec![Vec::new(); height + 1],
        })
    }

    /// Build a tree from leaves in index order
    pub fn from_leaves(height: usize, leaves: Vec<[u8; 32]>) -> Result<Self> {
        check_height(height)?;
        if leaves.len() as u64 > capacity_of(height) {
            return Err(PrivacyError::TreeFull {
                capacity: capacity_of(height),
            });
        }

        let zeros = zero_hashes();
        let h = hasher();
        let mut layers = Vec::with_capacity(height + 1);
        layers.push(leaves);
        for zero in zeros.iter().take(height) {
            let next = layers[layers.len() - 1]
                .chunks(2)
                .map(|pair: &[[u8; 32]]| h.hash_pair(&pair[0], pair.get(1).unwrap_or(zero)))
                .collect();
            layers.push(next);
        }

        Ok(Self { height, layers })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        capacity_of(self.height)
    }

    /// Number of leaves
    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn root(&self) -> [u8; 32] {
        self.layers[self.height]
            .first()
            .copied()
            .unwrap_or(zero_hashes()[self.height])
    }

    pub fn leaf(&self, index: u64) -> Option<[u8; 32]> {
        self.layers[0].get(index as usize).copied()
    }

    pub fn leaves(&self) -> &[[u8; 32]] {
        &self.layers[0]
    }

    /// Append a leaf and return its index
    pub fn insert(&mut self, leaf: [u8; 32]) -> Result<u64> {
        if self.len() >= self.capacity() {
            return Err(PrivacyError::TreeFull {
                capacity: self.capacity(),
            });
        }
        let index = self.len();
        self.layers[0].push(leaf);
        self.refresh(index as usize);
        Ok(index)
    }

    /// Overwrite an existing leaf in place
    pub fn update(&mut self, index: u64, leaf: [u8; 32]) -> Result<()> {
        let size = self.len();
        let slot = self
            .layers[0]
            .get_mut(index as usize)
            .ok_or(PrivacyError::UnknownLeaf { index, size })?;
        *slot = leaf;
        self.refresh(index as usize);
        Ok(())
    }

    /// Sibling path from leaf `index` to the current root
    pub fn path_to(&self, index: u64) -> Result<MerklePath> {
        if index >= self.len() {
            return Err(PrivacyError::UnknownLeaf {
                index,
                size: self.len(),
            });
        }

        let zeros = zero_hashes();
        let mut siblings = Vec::with_capacity(self.height);
        let mut path_bits = Vec::with_capacity(self.height);
        let mut i = index as usize;
        for level in 0..self.height {
            path_bits.push(i % 2 == 1);
            let sibling = self.layers[level]
                .get(i ^ 1)
                .copied()
                .unwrap_or(zeros[level]);
            siblings.push(sibling);
            i /= 2;
        }

        Ok(MerklePath {
            siblings,
            path_bits,
            index,
        })
    }

    fn refresh(&mut self, index: usize) {
        let zeros = zero_hashes();
        let h = hasher();
        let mut i = index;
        for level in 0..self.height {
            let left_index = i & !1;
            let left = self.layers[level][left_index];
            let right = self.layers[level]
                .get(left_index + 1)
                .copied()
                .unwrap_or(zeros[level]);
            let parent = h.hash_pair(&left, &right);

            i /= 2;
            let next = &mut self.layers[level + 1];
            if i < next.len() {
                next[i] = parent;
            } else {
                next.push(parent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> [u8; 32] {
        let mut l = [0u8; 32];
        l[31] = n;
        l[0] = 0x01;
        l
    }

    #[test]
    fn test_new_empty() {
        let acc = Accumulator::new(DEFAULT_HEIGHT, ROOT_HISTORY_SIZE).unwrap();
        let zeros = zero_hashes();

        assert_eq!(acc.next_index(), 0);
        assert_eq!(acc.root(), zeros[DEFAULT_HEIGHT]);
        assert_eq!(acc.state().subtrees, zeros[..DEFAULT_HEIGHT].to_vec());
        assert_eq!(acc.root_history()[0], acc.root());
        assert!(acc.is_known_root(&acc.root()));
    }

    #[test]
    fn test_zero_root_never_known() {
        let acc = Accumulator::new(4, 8).unwrap();
        assert!(!acc.is_known_root(&[0u8; 32]));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert_eq!(
            Accumulator::new(0, 10).unwrap_err(),
            PrivacyError::InvalidHeight(0)
        );
        assert_eq!(
            Accumulator::new(MAX_HEIGHT + 1, 10).unwrap_err(),
            PrivacyError::InvalidHeight(MAX_HEIGHT + 1)
        );
        assert_eq!(
            Accumulator::new(4, 0).unwrap_err(),
            PrivacyError::InvalidHistorySize
        );
    }

    #[test]
    fn test_accumulator_matches_reference_root() {
        let height = 4;
        let mut acc = Accumulator::new(height, 32).unwrap();
        let mut leaves = Vec::new();

        for n in 0..16u8 {
            let l = leaf(n);
            let index = acc.insert(l).unwrap();
            leaves.push(l);
            assert_eq!(index, n as u64);
            assert_eq!(
                acc.root(),
                compute_root(&leaves, height).unwrap(),
                "root diverged after {} leaves",
                leaves.len()
            );
        }
    }

    #[test]
    fn test_tree_full() {
        let mut acc = Accumulator::new(2, 8).unwrap();
        for n in 0..4 {
            acc.insert(leaf(n)).unwrap();
        }
        let before = acc.clone();

        assert_eq!(
            acc.insert(leaf(9)).unwrap_err(),
            PrivacyError::TreeFull { capacity: 4 }
        );
        assert_eq!(acc, before, "failed insert must not mutate state");
    }

    #[test]
    fn test_insert_pair_is_all_or_nothing() {
        let mut acc = Accumulator::new(2, 8).unwrap();
        acc.insert(leaf(0)).unwrap();
        acc.insert(leaf(1)).unwrap();
        acc.insert(leaf(2)).unwrap();
        let before = acc.clone();

        assert!(acc.insert_pair(leaf(3), leaf(4)).is_err());
        assert_eq!(acc, before);
    }

    #[test]
    fn test_root_history_window() {
        let history = 4;
        let mut acc = Accumulator::new(4, history).unwrap();
        let mut roots = vec![acc.root()];

        for n in 0..6u8 {
            acc.insert(leaf(n)).unwrap();
            roots.push(acc.root());

            let known = roots.iter().filter(|r| acc.is_known_root(r)).count();
            assert_eq!(known, roots.len().min(history));
        }

        // Oldest roots have been evicted, the latest `history` remain
        assert!(!acc.is_known_root(&roots[0]));
        assert!(!acc.is_known_root(&roots[2]));
        for root in &roots[roots.len() - history..] {
            assert!(acc.is_known_root(root));
        }
        assert_eq!(acc.root_history()[acc.state().root_index as usize], acc.root());
    }

    #[test]
    fn test_state_roundtrip_and_validation() {
        let mut acc = Accumulator::new(5, 10).unwrap();
        acc.insert_pair(leaf(1), leaf(2)).unwrap();

        let restored = Accumulator::from_state(acc.state().clone()).unwrap();
        assert_eq!(restored, acc);

        let mut broken = acc.state().clone();
        broken.subtrees.pop();
        assert!(Accumulator::from_state(broken).is_err());

        let mut broken = acc.state().clone();
        broken.root = [9u8; 32];
        assert!(Accumulator::from_state(broken).is_err());
    }

    #[test]
    fn test_layered_tree_matches_accumulator() {
        let height = 5;
        let mut acc = Accumulator::new(height, 10).unwrap();
        let mut tree = MerkleTree::new(height).unwrap();

        for n in 0..11u8 {
            acc.insert(leaf(n)).unwrap();
            tree.insert(leaf(n)).unwrap();
            assert_eq!(tree.root(), acc.root());
        }

        let rebuilt = MerkleTree::from_leaves(height, tree.leaves().to_vec()).unwrap();
        assert_eq!(rebuilt.root(), tree.root());
    }

    #[test]
    fn test_paths_verify_against_current_root() {
        let mut tree = MerkleTree::new(4).unwrap();
        for n in 0..7u8 {
            tree.insert(leaf(n)).unwrap();
        }

        for index in 0..tree.len() {
            let path = tree.path_to(index).unwrap();
            assert!(
                path.verify(&leaf(index as u8), &tree.root()),
                "path for leaf {} does not verify",
                index
            );
            assert!(!path.verify(&leaf(99), &tree.root()));
        }

        assert_eq!(
            tree.path_to(7).unwrap_err(),
            PrivacyError::UnknownLeaf { index: 7, size: 7 }
        );
    }

    #[test]
    fn test_update_in_place() {
        let mut tree = MerkleTree::new(3).unwrap();
        tree.insert(leaf(0)).unwrap();
        tree.insert(leaf(1)).unwrap();
        tree.update(0, leaf(5)).unwrap();

        assert_eq!(tree.root(), compute_root(&[leaf(5), leaf(1)], 3).unwrap());
        assert!(tree.update(2, leaf(6)).is_err());
    }

    #[test]
    fn test_empty_path_folds_to_empty_root() {
        let path = MerklePath::empty(6).unwrap();
        assert_eq!(path.compute_root(&EMPTY_LEAF), zero_hashes()[6]);
    }

    #[test]
    fn test_empty_path_rejects_bad_height() {
        assert_eq!(
            MerklePath::empty(0).unwrap_err(),
            PrivacyError::InvalidHeight(0)
        );
        assert_eq!(
            MerklePath::empty(MAX_HEIGHT + 2).unwrap_err(),
            PrivacyError::InvalidHeight(MAX_HEIGHT + 2)
        );
        assert_eq!(
            MerklePath::empty(MAX_HEIGHT).unwrap().siblings.len(),
            MAX_HEIGHT
        );
    }
}
