//! Shroud Privacy SDK
//!
//! UTXO-based shielded transfer primitives.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Shielded Transaction                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐ │
//! │  │  Nullifiers  │  │ Commitments  │  │   ExtData             │ │
//! │  │  (2 spent)   │  │  (2 created) │  │   (amounts, fee,      │ │
//! │  │              │  │              │  │    ciphertexts)       │ │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘ │
//! │         │                 │                     │ sha256        │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              ZK Proof (opaque)                           │   │
//! │  │  public: root, public_amount, ext_data_hash,             │   │
//! │  │          nullifiers[2], commitments[2]                   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod encryption;
pub mod error;
pub mod ext_data;
pub mod field;
pub mod keys;
pub mod merkle;
pub mod nullifier;
pub mod poseidon;
pub mod proof;
pub mod record;
pub mod utxo;

pub use commitment::Commitment;
pub use encryption::{EncryptionKey, KEY_DERIVATION_MESSAGE, scan_owned};
pub use error::PrivacyError;
pub use ext_data::{ExtData, public_amount};
pub use field::Fr;
pub use keys::UtxoKeypair;
pub use merkle::{
    Accumulator, AccumulatorState, DEFAULT_HEIGHT, MerklePath, MerkleTree, ROOT_HISTORY_SIZE,
    compute_root, zero_hashes,
};
pub use nullifier::Nullifier;
pub use proof::{Proof, PublicInputs};
pub use record::{PublishedRecord, decode_records};
pub use utxo::{Utxo, UtxoPlaintext};
