pub mod db;
pub mod memory;
pub mod slots;
pub mod store;

pub use db::RocksDbLedger;
pub use memory::MemoryLedger;
pub use store::{
    CommitmentRecord, LedgerBatch, LedgerError, LedgerStore, LedgerTxn, PoolAccount,
};
