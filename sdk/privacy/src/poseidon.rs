//! Poseidon hash over the BN254 scalar field
//!
//! One parameter set (width 3, rate 2, α = 5, 8 full + 57 partial rounds) is
//! used for every arity. Inputs are absorbed in order and one element is
//! squeezed. Callers always hash a fixed arity per purpose.

use std::sync::OnceLock;

use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::PrimeField;

use crate::field::{self, Fr};

static HASHER: OnceLock<PoseidonHasher> = OnceLock::new();

/// Process-wide hasher; round constants are generated on first use
pub fn hasher() -> &'static PoseidonHasher {
    HASHER.get_or_init(PoseidonHasher::new)
}

pub struct PoseidonHasher {
    config: PoseidonConfig<Fr>,
}

impl PoseidonHasher {
    fn new() -> Self {
        let (ark, mds) =
            find_poseidon_ark_and_mds::<Fr>(Fr::MODULUS_BIT_SIZE as u64, 2, 8, 57, 0);
        Self {
            config: PoseidonConfig::new(8, 57, 5, mds, ark, 2, 1),
        }
    }

    pub fn hash(&self, inputs: &[Fr]) -> Fr {
        let mut sponge = PoseidonSponge::new(&self.config);
        for input in inputs {
            sponge.absorb(input);
        }
        let result: Fr = sponge.squeeze_field_elements(1)[0];
        result
    }

    /// Hash two children to get their parent (byte-encoded nodes)
    pub fn hash_pair(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let parent = self.hash(&[field::from_bytes(left), field::from_bytes(right)]);
        field::to_bytes(&parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_eq!(hasher().hash(&[a, b]), hasher().hash(&[a, b]));
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_ne!(hasher().hash(&[a, b]), hasher().hash(&[b, a]));
    }

    #[test]
    fn test_hash_pair_matches_field_hash() {
        let left = field::to_bytes(&Fr::from(3u64));
        let right = field::to_bytes(&Fr::from(4u64));
        let expected = hasher().hash(&[Fr::from(3u64), Fr::from(4u64)]);
        assert_eq!(hasher().hash_pair(&left, &right), field::to_bytes(&expected));
    }
}
