//! External Data
//!
//! The non-private half of a transaction: who gets paid on withdrawal, the
//! signed public amount, the fee and the two output ciphertexts. The proof
//! commits to it through `ext_data_hash`, so none of these fields can be
//! swapped after proving.
//!
//! ```text
//! ext_data_hash = reduce_le( SHA256( borsh(ExtData) ) )
//! public_amount = (ext_amount - fee + P) mod P
//! ```

use ark_ff::PrimeField;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shroud_keypair::Pubkey;

use crate::error::{PrivacyError, Result};
use crate::field::{self, Fr};

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct ExtData {
    /// Withdrawal recipient (ignored for deposits, still hashed)
    pub recipient: Pubkey,
    /// Positive = deposit, negative = withdrawal
    pub ext_amount: i64,
    pub ciphertext_a: Vec<u8>,
    pub ciphertext_b: Vec<u8>,
    pub fee: u64,
}

impl ExtData {
    /// Field element the proof must carry as its `ext_data_hash` input
    pub fn hash_field(&self) -> Result<Fr> {
        let encoded = borsh::to_vec(self)
            .map_err(|_| PrivacyError::ExtDataEncoding)?;
        let digest: [u8; 32] = Sha256::digest(&encoded).into();
        Ok(Fr::from_le_bytes_mod_order(&digest))
    }

    /// Byte form of [`Self::hash_field`]
    pub fn hash(&self) -> Result<[u8; 32]> {
        Ok(field::to_bytes(&self.hash_field()?))
    }

    pub fn public_amount(&self) -> Fr {
        public_amount(self.ext_amount, self.fee)
    }
}

/// `(ext_amount - fee + P) mod P`, computed without overflow
pub fn public_amount(ext_amount: i64, fee: u64) -> Fr {
    field::signed_to_field(ext_amount as i128 - fee as i128)
}
