use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrivacyError {
    #[error("accumulator is full: capacity {capacity} leaves")]
    TreeFull { capacity: u64 },

    #[error("leaf {index} is not in the tree (size {size})")]
    UnknownLeaf { index: u64, size: u64 },

    #[error("unsupported tree height {0}")]
    InvalidHeight(usize),

    #[error("root history size must be at least 1")]
    InvalidHistorySize,

    #[error("corrupt accumulator state: {0}")]
    CorruptState(&'static str),

    #[error("ext data cannot be encoded")]
    ExtDataEncoding,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("malformed utxo plaintext: {0}")]
    MalformedPlaintext(&'static str),

    #[error("malformed published record: {0}")]
    MalformedRecord(&'static str),
}

pub type Result<T> = std::result::Result<T, PrivacyError>;
