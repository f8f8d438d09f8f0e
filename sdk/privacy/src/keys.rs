//! UTXO keypairs
//!
//! A UTXO owner is a field scalar `private` with `public = Poseidon(private)`.
//! The public key is what goes into commitments; the private key only ever
//! appears inside nullifier derivation.

use ark_std::UniformRand;
use rand::Rng;

use crate::commitment::Commitment;
use crate::field::Fr;
use crate::poseidon::hasher;

#[derive(Clone, PartialEq, Eq)]
pub struct UtxoKeypair {
    private: Fr,
    public: Fr,
}

impl UtxoKeypair {
    pub fn from_private(private: Fr) -> Self {
        let public = hasher().hash(&[private]);
        Self { private, public }
    }

    /// Fresh random keypair, unlinkable to any wallet
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self::from_private(Fr::rand(rng))
    }

    pub fn public_key(&self) -> Fr {
        self.public
    }

    pub fn private_key(&self) -> Fr {
        self.private
    }

    /// Poseidon(private, commitment, index)
    pub fn sign(&self, commitment: &Commitment, index: u64) -> Fr {
        hasher().hash(&[self.private, commitment.to_field(), Fr::from(index)])
    }
}

impl std::fmt::Debug for UtxoKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtxoKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_is_hash_of_private() {
        let kp = UtxoKeypair::from_private(Fr::from(42u64));
        assert_eq!(kp.public_key(), hasher().hash(&[Fr::from(42u64)]));
    }

    #[test]
    fn test_random_keypairs_differ() {
        let mut rng = rand::thread_rng();
        let a = UtxoKeypair::random(&mut rng);
        let b = UtxoKeypair::random(&mut rng);
        assert_ne!(a.public_key(), b.public_key());
    }
}
