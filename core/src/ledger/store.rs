//! Ledger store abstraction
//!
//! The processor never talks to a database directly. It stages reads and
//! writes in a [`LedgerTxn`] and hands the result to the store as one
//! [`LedgerBatch`], which the store applies all-or-nothing.

use std::collections::{HashMap, HashSet};

use shroud_keypair::Pubkey;
use shroud_privacy::{AccumulatorState, Commitment, Nullifier, PublishedRecord};
use thiserror::Error;
use wincode::{SchemaRead, SchemaWrite};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("nullifier already recorded: {0:?}")]
    NullifierExists(Nullifier),

    #[error("commitment already recorded: {0:?}")]
    CommitmentExists(Commitment),

    #[error("pool for authority {0} already exists")]
    PoolExists(Pubkey),

    #[error("insufficient funds in {account}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        account: Pubkey,
        balance: u64,
        needed: u64,
    },

    #[error("balance overflow on {0}")]
    Overflow(Pubkey),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

// ============================================================================
// Stored records
// ============================================================================

/// The pool slot: identity plus the persisted accumulator
#[derive(Debug, Clone, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct PoolAccount {
    pub authority: Pubkey,
    pub asset: Pubkey,
    pub accumulator: AccumulatorState,
}

/// A commitment slot and the ciphertext published with it
#[derive(Debug, Clone, PartialEq, Eq, SchemaRead, SchemaWrite)]
pub struct CommitmentRecord {
    pub authority: Pubkey,
    pub commitment: Commitment,
    pub ciphertext: Vec<u8>,
    pub index: u64,
}

impl CommitmentRecord {
    /// Public form consumed by wallets and the mirror
    pub fn to_published(&self) -> PublishedRecord {
        PublishedRecord::new(self.commitment, self.ciphertext.clone(), self.index)
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Writes a store must apply atomically
#[derive(Debug, Default, Clone)]
pub struct LedgerBatch {
    /// Pools to create; rejected if the slot exists
    pub new_pools: Vec<PoolAccount>,
    /// Pools to overwrite
    pub pools: Vec<PoolAccount>,
    /// Absolute balances
    pub balances: Vec<(Pubkey, u64)>,
    /// Create-only nullifier slots, keyed by authority
    pub nullifiers: Vec<(Pubkey, Nullifier)>,
    /// Create-only commitment slots
    pub commitments: Vec<CommitmentRecord>,
}

impl LedgerBatch {
    pub fn is_empty(&self) -> bool {
        self.new_pools.is_empty()
            && self.pools.is_empty()
            && self.balances.is_empty()
            && self.nullifiers.is_empty()
            && self.commitments.is_empty()
    }
}

/// Host ledger substrate
pub trait LedgerStore: Send + Sync {
    /// Native balance; missing accounts hold 0
    fn balance(&self, account: &Pubkey) -> Result<u64>;

    fn pool(&self, authority: &Pubkey) -> Result<Option<PoolAccount>>;

    fn has_nullifier(&self, authority: &Pubkey, nullifier: &Nullifier) -> Result<bool>;

    fn commitment(
        &self,
        authority: &Pubkey,
        commitment: &Commitment,
    ) -> Result<Option<CommitmentRecord>>;

    /// Every commitment recorded under `authority`, in no particular order
    fn commitments(&self, authority: &Pubkey) -> Result<Vec<CommitmentRecord>>;

    /// Apply every write or none of them
    fn apply_batch(&self, batch: LedgerBatch) -> Result<()>;
}

/// Reject batches that create the same slot twice
pub(crate) fn check_batch_unique(batch: &LedgerBatch) -> Result<()> {
    let mut pools = HashSet::new();
    for pool in &batch.new_pools {
        if !pools.insert(pool.authority) {
            return Err(LedgerError::PoolExists(pool.authority));
        }
    }
    let mut nullifiers = HashSet::new();
    for (authority, nullifier) in &batch.nullifiers {
        if !nullifiers.insert((*authority, *nullifier)) {
            return Err(LedgerError::NullifierExists(*nullifier));
        }
    }
    let mut commitments = HashSet::new();
    for record in &batch.commitments {
        if !commitments.insert((record.authority, record.commitment)) {
            return Err(LedgerError::CommitmentExists(record.commitment));
        }
    }
    Ok(())
}

// ============================================================================
// Transaction overlay
// ============================================================================

/// Staged view over a store, scoped to one authority.
///
/// Reads fall through to the store unless a write is staged. Nothing
/// reaches the store until [`LedgerTxn::commit`]; dropping the overlay
/// discards it.
pub struct LedgerTxn<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
    authority: Pubkey,
    balances: HashMap<Pubkey, u64>,
    nullifiers: Vec<Nullifier>,
    commitments: Vec<CommitmentRecord>,
    pool: Option<PoolAccount>,
}

impl<'a, S: LedgerStore + ?Sized> LedgerTxn<'a, S> {
    pub fn new(store: &'a S, authority: Pubkey) -> Self {
        Self {
            store,
            authority,
            balances: HashMap::new(),
            nullifiers: Vec::new(),
            commitments: Vec::new(),
            pool: None,
        }
    }

    pub fn authority(&self) -> &Pubkey {
        &self.authority
    }

    pub fn balance(&self, account: &Pubkey) -> Result<u64> {
        match self.balances.get(account) {
            Some(balance) => Ok(*balance),
            None => self.store.balance(account),
        }
    }

    pub fn credit(&mut self, account: &Pubkey, amount: u64) -> Result<()> {
        let balance = self.balance(account)?;
        let updated = balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(*account))?;
        self.balances.insert(*account, updated);
        Ok(())
    }

    pub fn debit(&mut self, account: &Pubkey, amount: u64) -> Result<()> {
        let balance = self.balance(account)?;
        let updated = balance
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                account: *account,
                balance,
                needed: amount,
            })?;
        self.balances.insert(*account, updated);
        Ok(())
    }

    /// Move `amount` between two accounts inside the overlay
    pub fn transfer(&mut self, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Stage a spent nullifier. Returns `false` if it is already spent,
    /// either in the store or earlier in this overlay.
    pub fn insert_nullifier_if_absent(&mut self, nullifier: Nullifier) -> Result<bool> {
        if self.nullifiers.contains(&nullifier)
            || self.store.has_nullifier(&self.authority, &nullifier)?
        {
            return Ok(false);
        }
        self.nullifiers.push(nullifier);
        Ok(true)
    }

    /// Stage a created commitment. Returns `false` on collision.
    pub fn insert_commitment_if_absent(&mut self, record: CommitmentRecord) -> Result<bool> {
        let staged = self
            .commitments
            .iter()
            .any(|r| r.commitment == record.commitment);
        if staged
            || self
                .store
                .commitment(&self.authority, &record.commitment)?
                .is_some()
        {
            return Ok(false);
        }
        self.commitments.push(CommitmentRecord {
            authority: self.authority,
            ..record
        });
        Ok(true)
    }

    /// Stage an updated pool slot
    pub fn put_pool(&mut self, pool: PoolAccount) {
        self.pool = Some(pool);
    }

    pub fn into_batch(self) -> LedgerBatch {
        let authority = self.authority;
        LedgerBatch {
            new_pools: Vec::new(),
            pools: self.pool.into_iter().collect(),
            balances: self.balances.into_iter().collect(),
            nullifiers: self
                .nullifiers
                .into_iter()
                .map(|nullifier| (authority, nullifier))
                .collect(),
            commitments: self.commitments,
        }
    }

    /// Hand every staged write to the store as one batch
    pub fn commit(self) -> Result<()> {
        let store = self.store;
        let batch = self.into_batch();
        if batch.is_empty() {
            return Ok(());
        }
        store.apply_batch(batch)
    }
}
