//! Local replica of the accumulator
//!
//! Notices arrive out of order and sometimes twice. Anything ahead of the
//! current size waits in `pending` until the gap before it closes.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use shroud_privacy::error::Result;
use shroud_privacy::{Commitment, MerklePath, MerkleTree, PrivacyError, PublishedRecord};

/// Membership proof served against the mirror's current tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorProof {
    pub index: u64,
    /// Root the path folds to
    pub root: [u8; 32],
    pub path: MerklePath,
}

#[derive(Debug, Clone)]
pub struct MirrorTree {
    tree: MerkleTree,
    indices: HashMap<Commitment, u64>,
    records: BTreeMap<u64, PublishedRecord>,
    pending: BTreeMap<u64, PublishedRecord>,
}

impl MirrorTree {
    pub fn new(height: usize) -> Result<Self> {
        Ok(Self {
            tree: MerkleTree::new(height)?,
            indices: HashMap::new(),
            records: BTreeMap::new(),
            pending: BTreeMap::new(),
        })
    }

    /// Rebuild from the authoritative record set. The indices must be
    /// exactly `0..n` once sorted.
    pub fn from_records(height: usize, mut records: Vec<PublishedRecord>) -> Result<Self> {
        records.sort_by_key(|r| r.index);

        let mut leaves = Vec::with_capacity(records.len());
        let mut indices = HashMap::with_capacity(records.len());
        for (expected, record) in records.iter().enumerate() {
            if record.index != expected as u64 {
                return Err(PrivacyError::CorruptState(
                    "ledger commitments are not contiguous",
                ));
            }
            if indices.insert(record.commitment, record.index).is_some() {
                return Err(PrivacyError::CorruptState("duplicate commitment in ledger"));
            }
            leaves.push(record.commitment.0);
        }

        Ok(Self {
            tree: MerkleTree::from_leaves(height, leaves)?,
            indices,
            records: records.into_iter().map(|r| (r.index, r)).collect(),
            pending: BTreeMap::new(),
        })
    }

    pub fn height(&self) -> usize {
        self.tree.height()
    }

    pub fn len(&self) -> u64 {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn root(&self) -> [u8; 32] {
        self.tree.root()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.indices.contains_key(commitment)
    }

    /// Record a commitment at `record.index`.
    ///
    /// Returns `false` if the commitment is already applied or already
    /// waiting in `pending`.
    pub fn add_commitment(&mut self, record: PublishedRecord) -> Result<bool> {
        if self.indices.contains_key(&record.commitment)
            || self
                .pending
                .get(&record.index)
                .is_some_and(|p| p.commitment == record.commitment)
        {
            return Ok(false);
        }

        let size = self.tree.len();
        if record.index == size {
            self.append(record)?;
            self.drain_pending()?;
        } else if record.index < size {
            warn!(
                "Mirror correcting leaf {} in place (size {})",
                record.index, size
            );
            self.replace(record)?;
        } else {
            debug!(
                "Mirror queued leaf {} ahead of size {}",
                record.index, size
            );
            if let Some(old) = self.pending.insert(record.index, record) {
                warn!(
                    "Mirror replaced a different pending commitment at {}",
                    old.index
                );
            }
        }
        Ok(true)
    }

    /// Path for the leaf at `index` against the current root
    pub fn path_to(&self, index: u64) -> Result<MirrorProof> {
        Ok(MirrorProof {
            index,
            root: self.tree.root(),
            path: self.tree.path_to(index)?,
        })
    }

    pub fn path_for(&self, commitment: &Commitment) -> Option<MirrorProof> {
        let index = *self.indices.get(commitment)?;
        self.path_to(index).ok()
    }

    /// Applied records in index order
    pub fn records(&self) -> Vec<PublishedRecord> {
        self.records.values().cloned().collect()
    }

    fn append(&mut self, record: PublishedRecord) -> Result<()> {
        let index = self.tree.insert(record.commitment.0)?;
        self.indices.insert(record.commitment, index);
        self.records.insert(index, record);
        Ok(())
    }

    fn replace(&mut self, record: PublishedRecord) -> Result<()> {
        self.tree.update(record.index, record.commitment.0)?;
        if let Some(old) = self.records.insert(record.index, record.clone()) {
            self.indices.remove(&old.commitment);
        }
        self.indices.insert(record.commitment, record.index);
        Ok(())
    }

    /// Apply queued entries while the smallest one lands exactly at the end
    fn drain_pending(&mut self) -> Result<()> {
        while let Some(entry) = self.pending.first_entry() {
            let size = self.tree.len();
            if *entry.key() > size {
                break;
            }
            let record = entry.remove();
            if record.index < size || self.indices.contains_key(&record.commitment) {
                warn!("Mirror dropped stale pending leaf {}", record.index);
                continue;
            }
            self.append(record)?;
        }
        Ok(())
    }
}
