use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use shroud_keypair::Pubkey;
use shroud_privacy::{Commitment, Nullifier};

use super::slots;
use super::store::{
    CommitmentRecord, LedgerBatch, LedgerError, LedgerStore, PoolAccount, Result,
    check_batch_unique,
};

#[derive(Default)]
struct Tables {
    balances: HashMap<Pubkey, u64>,
    pools: HashMap<Pubkey, PoolAccount>,
    nullifiers: HashSet<Pubkey>,
    commitments: HashMap<Pubkey, CommitmentRecord>,
}

/// In-process ledger. Each instance is isolated, so tests build their own.
#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a native balance outside any transaction
    pub fn set_balance(&self, account: Pubkey, amount: u64) -> Result<()> {
        self.lock()?.balances.insert(account, amount);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| LedgerError::Backend("memory ledger lock poisoned".into()))
    }
}

impl LedgerStore for MemoryLedger {
    fn balance(&self, account: &Pubkey) -> Result<u64> {
        Ok(self.lock()?.balances.get(account).copied().unwrap_or(0))
    }

    fn pool(&self, authority: &Pubkey) -> Result<Option<PoolAccount>> {
        Ok(self
            .lock()?
            .pools
            .get(&slots::pool_address(authority))
            .cloned())
    }

    fn has_nullifier(&self, authority: &Pubkey, nullifier: &Nullifier) -> Result<bool> {
        Ok(self
            .lock()?
            .nullifiers
            .contains(&slots::nullifier_address(authority, nullifier)))
    }

    fn commitment(
        &self,
        authority: &Pubkey,
        commitment: &Commitment,
    ) -> Result<Option<CommitmentRecord>> {
        Ok(self
            .lock()?
            .commitments
            .get(&slots::commitment_address(authority, commitment))
            .cloned())
    }

    fn commitments(&self, authority: &Pubkey) -> Result<Vec<CommitmentRecord>> {
        Ok(self
            .lock()?
            .commitments
            .values()
            .filter(|r| &r.authority == authority)
            .cloned()
            .collect())
    }

    fn apply_batch(&self, batch: LedgerBatch) -> Result<()> {
        check_batch_unique(&batch)?;
        let mut tables = self.lock()?;

        // Validate every create-only slot before touching anything
        for pool in &batch.new_pools {
            if tables
                .pools
                .contains_key(&slots::pool_address(&pool.authority))
            {
                return Err(LedgerError::PoolExists(pool.authority));
            }
        }
        for (authority, nullifier) in &batch.nullifiers {
            if tables
                .nullifiers
                .contains(&slots::nullifier_address(authority, nullifier))
            {
                return Err(LedgerError::NullifierExists(*nullifier));
            }
        }
        for record in &batch.commitments {
            let address = slots::commitment_address(&record.authority, &record.commitment);
            if tables.commitments.contains_key(&address) {
                return Err(LedgerError::CommitmentExists(record.commitment));
            }
        }

        for pool in batch.new_pools.into_iter().chain(batch.pools) {
            tables
                .pools
                .insert(slots::pool_address(&pool.authority), pool);
        }
        for (account, amount) in batch.balances {
            tables.balances.insert(account, amount);
        }
        for (authority, nullifier) in batch.nullifiers {
            tables
                .nullifiers
                .insert(slots::nullifier_address(&authority, &nullifier));
        }
        for record in batch.commitments {
            let address = slots::commitment_address(&record.authority, &record.commitment);
            tables.commitments.insert(address, record);
        }
        Ok(())
    }
}
