//! UTXO Commitments
//!
//! ```text
//! Commitment = Poseidon(amount, owner_pubkey, blinding)
//! ```
//!
//! Hides the UTXO contents while letting the circuit prove knowledge of them.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use crate::field::{self, Fr};
use crate::poseidon::hasher;

/// A UTXO commitment (32 bytes, big-endian field element)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Commit to a UTXO
    pub fn commit(amount: u64, owner_pubkey: &Fr, blinding: &Fr) -> Self {
        Self::from_field(hasher().hash(&[Fr::from(amount), *owner_pubkey, *blinding]))
    }

    /// Create commitment from field element
    pub fn from_field(f: Fr) -> Self {
        Self(field::to_bytes(&f))
    }

    /// Convert to field element
    pub fn to_field(&self) -> Fr {
        field::from_bytes(&self.0)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
