use shroud_keypair::Pubkey;
use shroud_privacy::{Commitment, Nullifier, PrivacyError};
use thiserror::Error;

use crate::ledger::LedgerError;

/// Every way a transaction can be refused. A refused transaction leaves the
/// ledger untouched.
#[derive(Debug, Error)]
pub enum TransactError {
    #[error("ext data hash does not match the proof")]
    ExtDataHashMismatch,

    #[error("proof root is zero or not in the root history")]
    UnknownRoot,

    #[error("public amount does not equal ext_amount - fee")]
    InvalidPublicAmountData,

    #[error("proof verification failed")]
    ProofVerificationFailed,

    #[error("nullifier already spent: {0:?}")]
    NullifierAlreadyExists(Nullifier),

    #[error("commitment already exists: {0:?}")]
    CommitmentAlreadyExists(Commitment),

    #[error("request slots do not belong to authority {0}")]
    AuthorityMismatch(Pubkey),

    #[error("asset {got} does not match pool asset {expected}")]
    AssetMismatch { expected: Pubkey, got: Pubkey },

    #[error("accumulator is full ({capacity} leaves)")]
    TreeFull { capacity: u64 },

    #[error("insufficient funds in {account}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        account: Pubkey,
        balance: u64,
        needed: u64,
    },

    #[error("balance overflow on {0}")]
    ArithmeticOverflow(Pubkey),

    #[error("no pool initialized for authority {0}")]
    PoolNotInitialized(Pubkey),

    #[error("pool already initialized for authority {0}")]
    PoolAlreadyInitialized(Pubkey),

    #[error("verifier error: {0}")]
    Verifier(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl TransactError {
    /// Whether resubmitting with fresh public inputs can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UnknownRoot | Self::Storage(_))
    }
}

impl From<LedgerError> for TransactError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NullifierExists(n) => Self::NullifierAlreadyExists(n),
            LedgerError::CommitmentExists(c) => Self::CommitmentAlreadyExists(c),
            LedgerError::PoolExists(authority) => Self::PoolAlreadyInitialized(authority),
            LedgerError::InsufficientFunds {
                account,
                balance,
                needed,
            } => Self::InsufficientFunds {
                account,
                balance,
                needed,
            },
            LedgerError::Overflow(account) => Self::ArithmeticOverflow(account),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<PrivacyError> for TransactError {
    fn from(e: PrivacyError) -> Self {
        match e {
            PrivacyError::TreeFull { capacity } => Self::TreeFull { capacity },
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransactError>;
