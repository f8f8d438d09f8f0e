//! Proof envelope
//!
//! The proof blob itself is opaque; only its public inputs are typed.
//! Verifiers consume them in this fixed order:
//!
//! ```text
//! [root, public_amount, ext_data_hash, nullifier_a, nullifier_b, commitment_a, commitment_b]
//! ```

use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::field::{self, Fr};
use crate::nullifier::Nullifier;

/// Number of public inputs the circuit exposes
pub const PUBLIC_INPUT_COUNT: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub root: [u8; 32],
    pub public_amount: [u8; 32],
    pub ext_data_hash: [u8; 32],
    pub nullifiers: [Nullifier; 2],
    pub commitments: [Commitment; 2],
}

impl PublicInputs {
    pub fn to_field_elements(&self) -> [Fr; PUBLIC_INPUT_COUNT] {
        [
            field::from_bytes(&self.root),
            field::from_bytes(&self.public_amount),
            field::from_bytes(&self.ext_data_hash),
            self.nullifiers[0].to_field(),
            self.nullifiers[1].to_field(),
            self.commitments[0].to_field(),
            self.commitments[1].to_field(),
        ]
    }

    /// Concatenated 32-byte encodings in verifier order
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PUBLIC_INPUT_COUNT * 32);
        out.extend_from_slice(&self.root);
        out.extend_from_slice(&self.public_amount);
        out.extend_from_slice(&self.ext_data_hash);
        for nf in &self.nullifiers {
            out.extend_from_slice(nf.as_bytes());
        }
        for cm in &self.commitments {
            out.extend_from_slice(cm.as_bytes());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Opaque proof bytes produced by the external prover
    pub proof: Vec<u8>,
    pub inputs: PublicInputs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_order_is_fixed() {
        let inputs = PublicInputs {
            root: field::to_bytes(&Fr::from(1u64)),
            public_amount: field::to_bytes(&Fr::from(2u64)),
            ext_data_hash: field::to_bytes(&Fr::from(3u64)),
            nullifiers: [
                Nullifier::from_field(Fr::from(4u64)),
                Nullifier::from_field(Fr::from(5u64)),
            ],
            commitments: [
                Commitment::from_field(Fr::from(6u64)),
                Commitment::from_field(Fr::from(7u64)),
            ],
        };

        let expected: Vec<Fr> = (1..=7u64).map(Fr::from).collect();
        assert_eq!(inputs.to_field_elements().to_vec(), expected);

        let bytes = inputs.to_bytes();
        assert_eq!(bytes.len(), PUBLIC_INPUT_COUNT * 32);
        assert_eq!(bytes[31], 1);
        assert_eq!(bytes[7 * 32 - 1], 7);
    }
}
