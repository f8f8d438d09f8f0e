use std::sync::Arc;

use anyhow::Result;
use shroud_keypair::Pubkey;
use shroud_privacy::PublishedRecord;

use crate::ledger::{CommitmentRecord, LedgerStore};

/// Authoritative commitment set the mirror reconciles against
pub trait CommitmentSource: Send + Sync + 'static {
    fn load_records(&self) -> Result<Vec<PublishedRecord>>;
}

/// Reads commitments for one authority straight from a ledger store
pub struct LedgerSource {
    store: Arc<dyn LedgerStore>,
    authority: Pubkey,
}

impl LedgerSource {
    pub fn new(store: Arc<dyn LedgerStore>, authority: Pubkey) -> Self {
        Self { store, authority }
    }
}

impl CommitmentSource for LedgerSource {
    fn load_records(&self) -> Result<Vec<PublishedRecord>> {
        let mut records = self.store.commitments(&self.authority)?;
        records.sort_by_key(|r| r.index);
        Ok(records.iter().map(CommitmentRecord::to_published).collect())
    }
}
