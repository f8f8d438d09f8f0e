//! UTXO Encryption
//!
//! Every secret a wallet needs is re-derived from one deterministic
//! signature, so nothing beyond the wallet's signing key is ever stored.
//!
//! ```text
//! Key derivation:
//! 1. sig = Ed25519Sign(wallet_sk, KEY_DERIVATION_MESSAGE)
//! 2. K = sig[0..31]
//! 3. utxo_private(salt) = reduce( SHA256(K || salt) )
//!
//! Encryption (encrypt-then-MAC):
//! 1. iv  = random 16 bytes
//! 2. ct  = AES-128-CTR(K[0..16], iv, plaintext)
//! 3. tag = HMAC-SHA256(K[16..31], iv || ct)[0..16]
//! 4. Output = iv || tag || ct
//! ```

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use shroud_keypair::Keypair;
use subtle::ConstantTimeEq;

use crate::error::{PrivacyError, Result};
use crate::field;
use crate::keys::UtxoKeypair;
use crate::record::PublishedRecord;
use crate::utxo::{Utxo, UtxoPlaintext};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Message the wallet signs to derive its codec key
pub const KEY_DERIVATION_MESSAGE: &[u8] = b"shroud: derive utxo encryption key v1";

/// Length of the root symmetric key `K`
pub const KEY_LEN: usize = 31;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
/// Fixed overhead of an encrypted blob
pub const OVERHEAD: usize = IV_LEN + TAG_LEN;

/// Root symmetric key `K`, held for the lifetime of a wallet session
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    key: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Derive `K` from the wallet's signature over the fixed message
    pub fn derive(wallet: &Keypair) -> Self {
        let signature = wallet.sign(KEY_DERIVATION_MESSAGE);
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&signature[..KEY_LEN]);
        Self { key }
    }

    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// UTXO keypair for `salt`; distinct salts give unlinkable identities
    pub fn utxo_keypair(&self, salt: &[u8]) -> UtxoKeypair {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(salt);
        let digest: [u8; 32] = hasher.finalize().into();
        UtxoKeypair::from_private(field::from_bytes(&digest))
    }

    /// Encrypt with a fresh random IV
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, iv)
    }

    /// Encrypt with a caller-chosen IV. Never reuse an IV under the same key.
    pub fn encrypt_with_iv(&self, plaintext: &[u8], iv: [u8; IV_LEN]) -> Result<Vec<u8>> {
        let mut ciphertext = plaintext.to_vec();
        let mut cipher = Aes128Ctr::new(&self.cipher_key().into(), &iv.into());
        cipher.apply_keystream(&mut ciphertext);

        let tag = self.tag(&iv, &ciphertext)?;

        let mut out = Vec::with_capacity(OVERHEAD + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&tag);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Authenticate then decrypt. Any mismatch is `DecryptionFailed`.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < OVERHEAD {
            return Err(PrivacyError::DecryptionFailed);
        }
        let (iv, rest) = blob.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut iv_arr = [0u8; IV_LEN];
        iv_arr.copy_from_slice(iv);

        let expected = self.tag(&iv_arr, ciphertext)?;
        if !bool::from(expected.as_slice().ct_eq(tag)) {
            return Err(PrivacyError::DecryptionFailed);
        }

        let mut plaintext = ciphertext.to_vec();
        let mut cipher = Aes128Ctr::new(&self.cipher_key().into(), &iv_arr.into());
        cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }

    /// Encrypt a UTXO that will land at `index`
    pub fn encrypt_utxo(&self, utxo: &Utxo, index: u64) -> Result<Vec<u8>> {
        self.encrypt(&utxo.plaintext(index).encode())
    }

    pub fn decrypt_utxo(&self, blob: &[u8]) -> Result<UtxoPlaintext> {
        UtxoPlaintext::decode(&self.decrypt(blob)?)
    }

    fn cipher_key(&self) -> [u8; 16] {
        let mut k = [0u8; 16];
        k.copy_from_slice(&self.key[..16]);
        k
    }

    fn tag(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<[u8; TAG_LEN]> {
        let mut mac = HmacSha256::new_from_slice(&self.key[16..])
            .map_err(|_| PrivacyError::DecryptionFailed)?;
        mac.update(iv);
        mac.update(ciphertext);
        let full = mac.finalize().into_bytes();

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&full[..TAG_LEN]);
        Ok(tag)
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Find the published UTXOs that belong to this wallet.
///
/// Linear scan over the whole anonymity set: a record is ours when it
/// authenticates under `key`, parses, and rebuilds the published commitment
/// under `keypair`. Failures are "not mine", never errors. The returned
/// UTXOs carry the index the ledger actually assigned.
pub fn scan_owned<'a, I>(key: &EncryptionKey, keypair: &UtxoKeypair, records: I) -> Vec<Utxo>
where
    I: IntoIterator<Item = &'a PublishedRecord>,
{
    records
        .into_iter()
        .filter_map(|record| {
            let plaintext = key.decrypt_utxo(&record.ciphertext).ok()?;
            let mut utxo = plaintext.into_utxo(keypair.clone());
            utxo.index = Some(record.index);
            (utxo.commitment() == record.commitment).then_some(utxo)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(seed: u8) -> Keypair {
        Keypair::from_seed(&[seed; 32])
    }

    #[test]
    fn test_key_derivation_is_deterministic() {
        let k1 = EncryptionKey::derive(&wallet(1));
        let k2 = EncryptionKey::derive(&wallet(1));
        let other = EncryptionKey::derive(&wallet(2));

        assert_eq!(k1, k2, "same wallet must give the same key");
        assert_ne!(k1, other);
    }

    #[test]
    fn test_salts_give_distinct_keypairs() {
        let key = EncryptionKey::derive(&wallet(1));
        assert_eq!(key.utxo_keypair(b"a"), key.utxo_keypair(b"a"));
        assert_ne!(
            key.utxo_keypair(b"a").public_key(),
            key.utxo_keypair(b"b").public_key()
        );
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = EncryptionKey::derive(&wallet(1));
        let cases: [&[u8]; 4] = [b"", b"x", b"150|123|4", &[7u8; 300]];
        for plaintext in cases {
            let blob = key.encrypt(plaintext).unwrap();
            assert_eq!(blob.len(), OVERHEAD + plaintext.len());
            assert_eq!(key.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_layout_is_iv_tag_ciphertext() {
        let key = EncryptionKey::from_bytes([5u8; KEY_LEN]);
        let iv = [9u8; IV_LEN];
        let blob = key.encrypt_with_iv(b"hello", iv).unwrap();

        assert_eq!(&blob[..IV_LEN], &iv);
        assert_eq!(
            &blob[IV_LEN..OVERHEAD],
            &key.tag(&iv, &blob[OVERHEAD..]).unwrap()
        );
        assert_ne!(&blob[OVERHEAD..], b"hello");
    }

    #[test]
    fn test_tag_is_hmac_over_mac_key_bytes() {
        let mut raw = [0u8; KEY_LEN];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = i as u8;
        }
        let key = EncryptionKey::from_bytes(raw);
        let iv = [3u8; IV_LEN];
        let blob = key.encrypt_with_iv(b"150|123|4", iv).unwrap();

        let mut mac = HmacSha256::new_from_slice(&raw[16..]).unwrap();
        mac.update(&iv);
        mac.update(&blob[OVERHEAD..]);
        let expected = mac.finalize().into_bytes();
        assert_eq!(&blob[IV_LEN..OVERHEAD], &expected[..TAG_LEN]);
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = EncryptionKey::derive(&wallet(1))
            .encrypt(b"secret")
            .unwrap();
        let result = EncryptionKey::derive(&wallet(2)).decrypt(&blob);
        assert_eq!(result, Err(PrivacyError::DecryptionFailed));
    }

    #[test]
    fn test_tampering_detected() {
        let key = EncryptionKey::derive(&wallet(1));
        let blob = key.encrypt(b"150|123|4").unwrap();

        for i in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                key.decrypt(&tampered),
                Err(PrivacyError::DecryptionFailed),
                "flip at byte {} went unnoticed",
                i
            );
        }
        assert_eq!(
            key.decrypt(&blob[..OVERHEAD - 1]),
            Err(PrivacyError::DecryptionFailed)
        );
    }

    #[test]
    fn test_scan_finds_only_own_records() {
        let mut rng = rand::thread_rng();
        let mine = EncryptionKey::derive(&wallet(1));
        let theirs = EncryptionKey::derive(&wallet(2));
        let my_kp = mine.utxo_keypair(b"default");
        let their_kp = theirs.utxo_keypair(b"default");

        let a = Utxo::new(40, my_kp.clone(), &mut rng);
        let b = Utxo::new(60, their_kp, &mut rng);
        let c = Utxo::new(7, my_kp.clone(), &mut rng);

        let records = vec![
            PublishedRecord::new(a.commitment(), mine.encrypt_utxo(&a, 0).unwrap(), 0),
            PublishedRecord::new(b.commitment(), theirs.encrypt_utxo(&b, 1).unwrap(), 1),
            // predicted index was stale; the ledger's index wins
            PublishedRecord::new(c.commitment(), mine.encrypt_utxo(&c, 2).unwrap(), 3),
        ];

        let found = scan_owned(&mine, &my_kp, &records);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].amount, 40);
        assert_eq!(found[0].index, Some(0));
        assert_eq!(found[1].amount, 7);
        assert_eq!(found[1].index, Some(3));
        assert_eq!(found[1].commitment(), c.commitment());
    }
}
