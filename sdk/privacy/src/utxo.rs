//! Shielded UTXOs
//!
//! A UTXO is `(amount, blinding, owner keypair, leaf index)`. The index is
//! unknown until the creating transaction lands; spending an un-inserted
//! (dummy) UTXO uses index 0.

use ark_std::UniformRand;
use num_bigint::BigUint;
use rand::Rng;

use crate::commitment::Commitment;
use crate::error::{PrivacyError, Result};
use crate::field::{self, FIELD_BYTES, Fr};
use crate::keys::UtxoKeypair;
use crate::nullifier::Nullifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub amount: u64,
    pub blinding: Fr,
    pub keypair: UtxoKeypair,
    pub index: Option<u64>,
}

impl Utxo {
    /// New UTXO with fresh blinding
    pub fn new<R: Rng>(amount: u64, keypair: UtxoKeypair, rng: &mut R) -> Self {
        Self {
            amount,
            blinding: Fr::rand(rng),
            keypair,
            index: None,
        }
    }

    /// Zero-amount filler for an unused input or output slot
    pub fn dummy<R: Rng>(keypair: UtxoKeypair, rng: &mut R) -> Self {
        Self::new(0, keypair, rng)
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn commitment(&self) -> Commitment {
        Commitment::commit(self.amount, &self.keypair.public_key(), &self.blinding)
    }

    pub fn nullifier(&self) -> Nullifier {
        Nullifier::derive(&self.keypair, &self.commitment(), self.index.unwrap_or(0))
    }

    /// The part of the UTXO that gets encrypted for its owner
    pub fn plaintext(&self, index: u64) -> UtxoPlaintext {
        UtxoPlaintext {
            amount: self.amount,
            blinding: self.blinding,
            index,
        }
    }
}

/// Decrypted UTXO contents.
///
/// Encoded as ASCII `amount|blinding|index`, all decimal, to keep the
/// on-ledger ciphertext small.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoPlaintext {
    pub amount: u64,
    pub blinding: Fr,
    pub index: u64,
}

impl UtxoPlaintext {
    pub fn encode(&self) -> Vec<u8> {
        let blinding = BigUint::from_bytes_be(&field::to_bytes(&self.blinding));
        format!("{}|{}|{}", self.amount, blinding, self.index).into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| PrivacyError::MalformedPlaintext("not utf-8"))?;
        let mut parts = text.split('|');
        let (Some(amount), Some(blinding), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PrivacyError::MalformedPlaintext("expected three fields"));
        };

        Ok(Self {
            amount: amount
                .parse()
                .map_err(|_| PrivacyError::MalformedPlaintext("amount"))?,
            blinding: decode_field(blinding)?,
            index: index
                .parse()
                .map_err(|_| PrivacyError::MalformedPlaintext("index"))?,
        })
    }

    /// Rebuild the spendable UTXO under `keypair`
    pub fn into_utxo(self, keypair: UtxoKeypair) -> Utxo {
        Utxo {
            amount: self.amount,
            blinding: self.blinding,
            keypair,
            index: Some(self.index),
        }
    }
}

/// Parse a decimal field element, rejecting values >= P
fn decode_field(s: &str) -> Result<Fr> {
    let value = BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or(PrivacyError::MalformedPlaintext("blinding"))?;
    let bytes = value.to_bytes_be();
    if bytes.len() > FIELD_BYTES {
        return Err(PrivacyError::MalformedPlaintext("blinding out of range"));
    }
    let mut arr = [0u8; FIELD_BYTES];
    arr[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    if !field::is_canonical(&arr) {
        return Err(PrivacyError::MalformedPlaintext("blinding out of range"));
    }
    Ok(field::from_bytes(&arr))
}
