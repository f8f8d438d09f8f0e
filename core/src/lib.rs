//! Shroud Core
//!
//! Host side of the shielded pool: the ledger substrate, the transaction
//! processor that is its only writer, proof verification and the mirror
//! that serves membership paths.

pub mod ledger;
pub mod mirror;
pub mod processor;
pub mod verifier;

pub use ledger::{LedgerStore, MemoryLedger, RocksDbLedger};
pub use mirror::{MirrorService, MirrorStatus};
pub use processor::{
    CommitmentNotice, ProcessorConfig, Receipt, TransactError, TransactRequest,
    TransactionProcessor,
};
pub use verifier::{Groth16Verifier, MockVerifier, ProofVerifier};

#[cfg(test)]
mod tests;
