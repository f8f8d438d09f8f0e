//! Transaction Processor
//!
//! The only code path that mutates the accumulator and the nullifier and
//! commitment slots. Each request runs to a single terminal outcome:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  authority / asset checks                                        │
//! │  1. ext_data_hash     == sha256(borsh(ext_data))                 │
//! │  2. root              ∈ root history (and non-zero)              │
//! │  3. public_amount     == ext_amount - fee  (mod P)               │
//! │  4. verifier(inputs, proof)                                      │
//! │  5. reserve nullifiers       ┐                                   │
//! │  6. reserve commitments      │ staged in one LedgerTxn,          │
//! │  7. accumulator insert x2    │ committed as one batch            │
//! │  8. settle value             ┘                                   │
//! │  9. receipt + commitment notices                                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure drops the staged overlay, so nothing reaches the store.

mod error;

pub use error::{Result, TransactError};

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use shroud_config::PoolConfig;
use shroud_keypair::Pubkey;
use shroud_privacy::{
    Accumulator, Commitment, DEFAULT_HEIGHT, ExtData, Nullifier, Proof, ROOT_HISTORY_SIZE, field,
};
use tokio::sync::mpsc;

use crate::ledger::{CommitmentRecord, LedgerBatch, LedgerStore, LedgerTxn, PoolAccount, slots};
use crate::verifier::ProofVerifier;

/// Accumulator shape for newly initialized pools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub height: usize,
    pub root_history_size: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            height: DEFAULT_HEIGHT,
            root_history_size: ROOT_HISTORY_SIZE,
        }
    }
}

impl From<&PoolConfig> for ProcessorConfig {
    fn from(config: &PoolConfig) -> Self {
        Self {
            height: config.height,
            root_history_size: config.root_history_size,
        }
    }
}

/// A shielded transaction as submitted by a client
#[derive(Debug, Clone)]
pub struct TransactRequest {
    pub authority: Pubkey,
    /// Must equal `pool_address(authority)`
    pub pool: Pubkey,
    /// Must equal `custody_address(authority)`
    pub custody: Pubkey,
    /// Must equal `fee_recipient_address(authority)`
    pub fee_recipient: Pubkey,
    pub asset: Pubkey,
    /// Pays `ext_amount` on deposits; unused otherwise
    pub depositor: Pubkey,
    pub proof: Proof,
    pub ext_data: ExtData,
}

impl TransactRequest {
    /// Request with every slot derived from `authority`
    pub fn new(
        authority: Pubkey,
        asset: Pubkey,
        depositor: Pubkey,
        proof: Proof,
        ext_data: ExtData,
    ) -> Self {
        Self {
            authority,
            pool: slots::pool_address(&authority),
            custody: slots::custody_address(&authority),
            fee_recipient: slots::fee_recipient_address(&authority),
            asset,
            depositor,
            proof,
            ext_data,
        }
    }
}

/// Outcome of an accepted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Accumulator root after both inserts
    pub root: [u8; 32],
    pub indices: [u64; 2],
    pub nullifiers: [Nullifier; 2],
    pub commitments: [Commitment; 2],
}

/// Pushed to the mirror after every accepted commitment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentNotice {
    pub commitment: Commitment,
    pub index: u64,
    pub ciphertext: Vec<u8>,
}

pub struct TransactionProcessor {
    store: Arc<dyn LedgerStore>,
    verifier: Box<dyn ProofVerifier>,
    config: ProcessorConfig,
    notifier: Option<mpsc::Sender<CommitmentNotice>>,
    /// Transactions never interleave
    lock: Mutex<()>,
}

impl TransactionProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        verifier: Box<dyn ProofVerifier>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            config,
            notifier: None,
            lock: Mutex::new(()),
        }
    }

    /// Forward accepted commitments to `notifier`
    pub fn with_notifier(mut self, notifier: mpsc::Sender<CommitmentNotice>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn pool(&self, authority: &Pubkey) -> Result<Option<PoolAccount>> {
        Ok(self.store.pool(authority)?)
    }

    /// Create the pool slot for `authority` with an empty accumulator
    pub fn initialize(&self, authority: Pubkey, asset: Pubkey) -> Result<PoolAccount> {
        let _guard = self.acquire()?;

        if self.store.pool(&authority)?.is_some() {
            return Err(TransactError::PoolAlreadyInitialized(authority));
        }

        let accumulator = Accumulator::new(self.config.height, self.config.root_history_size)?;
        let pool = PoolAccount {
            authority,
            asset,
            accumulator: accumulator.into_state(),
        };

        self.store.apply_batch(LedgerBatch {
            new_pools: vec![pool.clone()],
            ..Default::default()
        })?;

        info!(
            "Initialized pool for authority {} (asset {}, height {})",
            authority, asset, self.config.height
        );
        Ok(pool)
    }

    /// Validate and apply one shielded transaction
    pub fn transact(&self, request: &TransactRequest) -> Result<Receipt> {
        let _guard = self.acquire()?;

        match self.execute(request) {
            Ok((receipt, notices)) => {
                info!(
                    "Accepted transaction: leaves {}..={}, ext_amount {}, fee {}",
                    receipt.indices[0],
                    receipt.indices[1],
                    request.ext_data.ext_amount,
                    request.ext_data.fee
                );
                self.notify(notices);
                Ok(receipt)
            }
            Err(e) => {
                warn!("Rejected transaction: {}", e);
                Err(e)
            }
        }
    }

    fn acquire(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| TransactError::Storage("processor lock poisoned".into()))
    }

    fn check_authority(&self, request: &TransactRequest) -> Result<PoolAccount> {
        let authority = request.authority;
        if request.pool != slots::pool_address(&authority)
            || request.custody != slots::custody_address(&authority)
            || request.fee_recipient != slots::fee_recipient_address(&authority)
        {
            return Err(TransactError::AuthorityMismatch(authority));
        }

        let pool = self
            .store
            .pool(&authority)?
            .ok_or(TransactError::PoolNotInitialized(authority))?;
        if pool.authority != authority {
            return Err(TransactError::AuthorityMismatch(authority));
        }
        if pool.asset != request.asset {
            return Err(TransactError::AssetMismatch {
                expected: pool.asset,
                got: request.asset,
            });
        }
        Ok(pool)
    }

    fn execute(&self, request: &TransactRequest) -> Result<(Receipt, Vec<CommitmentNotice>)> {
        let pool = self.check_authority(request)?;
        let inputs = &request.proof.inputs;
        let ext = &request.ext_data;

        // 1. Bind ext data to this proof instance
        if ext.hash()? != inputs.ext_data_hash {
            return Err(TransactError::ExtDataHashMismatch);
        }

        // 2. Root must be recent
        let mut accumulator = Accumulator::from_state(pool.accumulator.clone())?;
        if !accumulator.is_known_root(&inputs.root) {
            return Err(TransactError::UnknownRoot);
        }

        // 3. One modular equation covers deposits and withdrawals
        if field::to_bytes(&ext.public_amount()) != inputs.public_amount {
            return Err(TransactError::InvalidPublicAmountData);
        }

        // 4. Opaque proof check
        match self.verifier.verify(inputs, &request.proof.proof) {
            Ok(true) => {}
            Ok(false) => return Err(TransactError::ProofVerificationFailed),
            Err(e) => return Err(TransactError::Verifier(e.to_string())),
        }

        let mut txn = LedgerTxn::new(self.store.as_ref(), request.authority);

        // 5. Spend both inputs
        for nullifier in inputs.nullifiers {
            if !txn.insert_nullifier_if_absent(nullifier)? {
                return Err(TransactError::NullifierAlreadyExists(nullifier));
            }
        }

        // 6. Reserve both outputs at the indices they are about to take
        let first = accumulator.next_index();
        let ciphertexts = [&ext.ciphertext_a, &ext.ciphertext_b];
        for (offset, (commitment, ciphertext)) in
            inputs.commitments.iter().zip(ciphertexts).enumerate()
        {
            let record = CommitmentRecord {
                authority: request.authority,
                commitment: *commitment,
                ciphertext: ciphertext.clone(),
                index: first + offset as u64,
            };
            if !txn.insert_commitment_if_absent(record)? {
                return Err(TransactError::CommitmentAlreadyExists(*commitment));
            }
        }

        // 7. Append both leaves
        let indices = accumulator.insert_pair(inputs.commitments[0].0, inputs.commitments[1].0)?;
        debug!("Inserted commitments at {:?}", indices);

        // 8. Move value
        self.settle(&mut txn, request)?;

        let root = accumulator.root();
        txn.put_pool(PoolAccount {
            accumulator: accumulator.into_state(),
            ..pool
        });
        txn.commit()?;

        let notices = inputs
            .commitments
            .iter()
            .zip(ciphertexts)
            .zip(indices)
            .map(|((commitment, ciphertext), index)| CommitmentNotice {
                commitment: *commitment,
                index,
                ciphertext: ciphertext.clone(),
            })
            .collect();

        Ok((
            Receipt {
                root,
                indices,
                nullifiers: inputs.nullifiers,
                commitments: inputs.commitments,
            },
            notices,
        ))
    }

    /// Custody moves by `ext_amount - fee`; the fee always leaves custody
    fn settle<S: LedgerStore + ?Sized>(
        &self,
        txn: &mut LedgerTxn<'_, S>,
        request: &TransactRequest,
    ) -> Result<()> {
        let ext = &request.ext_data;

        if ext.ext_amount > 0 {
            txn.transfer(&request.depositor, &request.custody, ext.ext_amount as u64)?;
        } else if ext.ext_amount < 0 {
            txn.transfer(&request.custody, &ext.recipient, ext.ext_amount.unsigned_abs())?;
        }

        txn.transfer(&request.custody, &request.fee_recipient, ext.fee)?;
        Ok(())
    }

    fn notify(&self, notices: Vec<CommitmentNotice>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for notice in notices {
            if let Err(e) = notifier.try_send(notice) {
                warn!("Dropped commitment notice: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::verifier::MockVerifier;

    fn processor() -> TransactionProcessor {
        TransactionProcessor::new(
            Arc::new(MemoryLedger::new()),
            Box::new(MockVerifier::new()),
            ProcessorConfig {
                height: 4,
                root_history_size: 3,
            },
        )
    }

    #[test]
    fn test_initialize_once() {
        let processor = processor();
        let authority = Pubkey::new([1u8; 32]);
        let asset = Pubkey::new([2u8; 32]);

        let pool = processor.initialize(authority, asset).unwrap();
        assert_eq!(pool.accumulator.next_index, 0);
        assert_eq!(pool.accumulator.height, 4);

        assert!(matches!(
            processor.initialize(authority, asset),
            Err(TransactError::PoolAlreadyInitialized(a)) if a == authority
        ));
    }

    #[test]
    fn test_processor_config_from_pool_config() {
        let config = ProcessorConfig::from(&PoolConfig::default());
        assert_eq!(config, ProcessorConfig::default());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TransactError::UnknownRoot.is_retryable());
        assert!(!TransactError::NullifierAlreadyExists(Nullifier([0u8; 32])).is_retryable());
        assert!(!TransactError::ProofVerificationFailed.is_retryable());
    }
}
