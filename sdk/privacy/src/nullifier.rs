//! Nullifiers
//!
//! ```text
//! signature = Poseidon(private_key, commitment, leaf_index)
//! Nullifier = Poseidon(commitment, leaf_index, signature)
//! ```
//!
//! Once a nullifier is recorded, the UTXO it was derived from can never be
//! spent again. Binding the leaf index means two UTXOs with identical
//! contents still get distinct nullifiers.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use crate::commitment::Commitment;
use crate::field::{self, Fr};
use crate::keys::UtxoKeypair;
use crate::poseidon::hasher;

/// A nullifier (32 bytes) - unique tag for a spent UTXO
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
pub struct Nullifier(pub [u8; 32]);

impl Nullifier {
    /// Derive the nullifier for the UTXO `commitment` at `index`
    pub fn derive(keypair: &UtxoKeypair, commitment: &Commitment, index: u64) -> Self {
        let signature = keypair.sign(commitment, index);
        let nf = hasher().hash(&[commitment.to_field(), Fr::from(index), signature]);
        Self::from_field(nf)
    }

    /// Create from field element
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

impl AsRef<[u8]> for Nullifier {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
