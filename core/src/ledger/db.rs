use std::path::Path;
use std::sync::{Arc, Mutex};

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use shroud_keypair::Pubkey;
use shroud_privacy::{Commitment, Nullifier};

use super::slots;
use super::store::{
    CommitmentRecord, LedgerBatch, LedgerError, LedgerStore, PoolAccount, Result,
    check_batch_unique,
};

const CF_BALANCES: &str = "balances";
const CF_POOLS: &str = "pools";
const CF_NULLIFIERS: &str = "nullifiers";
const CF_COMMITMENTS: &str = "commitments";

fn backend(e: rocksdb::Error) -> LedgerError {
    LedgerError::Backend(e.to_string())
}

fn codec<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Codec(e.to_string())
}

/// A thread-safe ledger on top of RocksDB.
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    /// Serializes check-then-write in `apply_batch`
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbLedger {
    /// Opens the database at the specified path, creating it if missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Options::default()),
            ColumnFamilyDescriptor::new(CF_POOLS, Options::default()),
            ColumnFamilyDescriptor::new(CF_NULLIFIERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_COMMITMENTS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, families).map_err(backend)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Backend(format!("{} CF missing", name)))
    }

    fn exists(&self, cf: &'static str, key: &Pubkey) -> Result<bool> {
        Ok(self
            .db
            .get_pinned_cf(self.cf(cf)?, key.as_bytes())
            .map_err(backend)?
            .is_some())
    }
}

impl LedgerStore for RocksDbLedger {
    fn balance(&self, account: &Pubkey) -> Result<u64> {
        match self
            .db
            .get_cf(self.cf(CF_BALANCES)?, account.as_bytes())
            .map_err(backend)?
        {
            Some(bytes) => wincode::deserialize::<u64>(&bytes).map_err(codec),
            None => Ok(0),
        }
    }

    fn pool(&self, authority: &Pubkey) -> Result<Option<PoolAccount>> {
        let key = slots::pool_address(authority);
        match self
            .db
            .get_cf(self.cf(CF_POOLS)?, key.as_bytes())
            .map_err(backend)?
        {
            Some(bytes) => Ok(Some(
                wincode::deserialize::<PoolAccount>(&bytes).map_err(codec)?,
            )),
            None => Ok(None),
        }
    }

    fn has_nullifier(&self, authority: &Pubkey, nullifier: &Nullifier) -> Result<bool> {
        self.exists(CF_NULLIFIERS, &slots::nullifier_address(authority, nullifier))
    }

    fn commitment(
        &self,
        authority: &Pubkey,
        commitment: &Commitment,
    ) -> Result<Option<CommitmentRecord>> {
        let key = slots::commitment_address(authority, commitment);
        match self
            .db
            .get_cf(self.cf(CF_COMMITMENTS)?, key.as_bytes())
            .map_err(backend)?
        {
            Some(bytes) => Ok(Some(
                wincode::deserialize::<CommitmentRecord>(&bytes).map_err(codec)?,
            )),
            None => Ok(None),
        }
    }

    fn commitments(&self, authority: &Pubkey) -> Result<Vec<CommitmentRecord>> {
        let cf = self.cf(CF_COMMITMENTS)?;
        let mut records = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(backend)?;
            let record = wincode::deserialize::<CommitmentRecord>(&value).map_err(codec)?;
            if &record.authority == authority {
                records.push(record);
            }
        }

        Ok(records)
    }

    fn apply_batch(&self, operations: LedgerBatch) -> Result<()> {
        check_batch_unique(&operations)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LedgerError::Backend("write lock poisoned".into()))?;

        for pool in &operations.new_pools {
            if self.exists(CF_POOLS, &slots::pool_address(&pool.authority))? {
                return Err(LedgerError::PoolExists(pool.authority));
            }
        }
        for (authority, nullifier) in &operations.nullifiers {
            if self.exists(CF_NULLIFIERS, &slots::nullifier_address(authority, nullifier))? {
                return Err(LedgerError::NullifierExists(*nullifier));
            }
        }
        for record in &operations.commitments {
            let key = slots::commitment_address(&record.authority, &record.commitment);
            if self.exists(CF_COMMITMENTS, &key)? {
                return Err(LedgerError::CommitmentExists(record.commitment));
            }
        }

        let cf_balances = self.cf(CF_BALANCES)?;
        let cf_pools = self.cf(CF_POOLS)?;
        let cf_nullifiers = self.cf(CF_NULLIFIERS)?;
        let cf_commitments = self.cf(CF_COMMITMENTS)?;

        let mut batch = WriteBatch::default();

        for pool in operations.new_pools.iter().chain(&operations.pools) {
            let bytes = wincode::serialize(pool).map_err(codec)?;
            batch.put_cf(cf_pools, slots::pool_address(&pool.authority).as_bytes(), bytes);
        }

        for (account, amount) in &operations.balances {
            let bytes = wincode::serialize(amount).map_err(codec)?;
            batch.put_cf(cf_balances, account.as_bytes(), bytes);
        }

        for (authority, nullifier) in &operations.nullifiers {
            let key = slots::nullifier_address(authority, nullifier);
            batch.put_cf(cf_nullifiers, key.as_bytes(), nullifier.as_bytes());
        }

        for record in &operations.commitments {
            let key = slots::commitment_address(&record.authority, &record.commitment);
            let bytes = wincode::serialize(record).map_err(codec)?;
            batch.put_cf(cf_commitments, key.as_bytes(), bytes);
        }

        self.db.write(batch).map_err(backend)?;
        Ok(())
    }
}
