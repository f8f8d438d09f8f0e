//! Wallet identities
//!
//! `Pubkey` is the 32-byte identity used for ledger accounts, pool
//! authorities and withdrawal recipients. `Keypair` wraps the wallet's
//! native ed25519 signing key; its deterministic signatures are what the
//! privacy codec derives UTXO keys from.

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signer, SigningKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use wincode::{SchemaRead, SchemaWrite};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PubkeyError {
    #[error("invalid base58 encoding")]
    InvalidBase58,
    #[error("invalid pubkey length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

#[derive(
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
    SchemaRead,
    SchemaWrite,
)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministically derives an address from a list of seeds.
    /// Formula: SHA256( seed_0 || seed_1 || ... )
    pub fn derive(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bs58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bs58())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.to_bs58())
    }
}

impl FromStr for Pubkey {
    type Err = PubkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| PubkeyError::InvalidBase58)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| PubkeyError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

/// A user's wallet signing key.
/// NEVER expose this struct's internals.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a fresh random wallet.
    pub fn new_random() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    /// Reconstructs a wallet from its 32-byte ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Returns the public address of this wallet.
    pub fn pubkey(&self) -> Pubkey {
        Pubkey(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs a message. Ed25519 is deterministic: same key and message
    /// always give the same signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubkey_bs58_roundtrip() {
        let pk = Keypair::from_seed(&[7u8; 32]).pubkey();
        let parsed: Pubkey = pk.to_bs58().parse().unwrap();
        assert_eq!(pk, parsed);
    }

    #[test]
    fn test_pubkey_rejects_short_input() {
        let short = bs58::encode([1u8; 16]).into_string();
        assert_eq!(
            short.parse::<Pubkey>(),
            Err(PubkeyError::InvalidLength(16))
        );
        assert_eq!("0OIl".parse::<Pubkey>(), Err(PubkeyError::InvalidBase58));
    }

    #[test]
    fn test_signatures_are_deterministic() {
        let kp = Keypair::from_seed(&[3u8; 32]);
        assert_eq!(kp.sign(b"hello"), kp.sign(b"hello"));
        assert_ne!(kp.sign(b"hello"), kp.sign(b"world"));
    }

    #[test]
    fn test_derive_depends_on_every_seed() {
        let a = Pubkey::derive(&[b"custody", &[1u8; 32]]);
        let b = Pubkey::derive(&[b"custody", &[2u8; 32]]);
        let c = Pubkey::derive(&[b"pool", &[1u8; 32]]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
