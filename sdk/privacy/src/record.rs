//! Published UTXO records
//!
//! Every accepted output is published in this layout so that wallets can
//! pull ciphertexts for an ownership scan:
//!
//! ```text
//! commitment (32) | ciphertext_len (u32 LE) | ciphertext (var) | leaf_index (u64 LE)
//! ```

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use crate::commitment::Commitment;
use crate::error::{PrivacyError, Result};

const PREFIX_LEN: usize = 32 + 4;
const SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
pub struct PublishedRecord {
    pub commitment: Commitment,
    pub ciphertext: Vec<u8>,
    pub index: u64,
}

impl PublishedRecord {
    pub fn new(commitment: Commitment, ciphertext: Vec<u8>, index: u64) -> Self {
        Self {
            commitment,
            ciphertext,
            index,
        }
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        PREFIX_LEN + self.ciphertext.len() + SUFFIX_LEN
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = u32::try_from(self.ciphertext.len())
            .map_err(|_| PrivacyError::MalformedRecord("ciphertext longer than u32::MAX"))?;

        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(self.commitment.as_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.index.to_le_bytes());
        Ok(out)
    }

    /// Decode one record from the front of `bytes`, returning it and the
    /// number of bytes consumed
    pub fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < PREFIX_LEN {
            return Err(PrivacyError::MalformedRecord("truncated header"));
        }

        let mut commitment = [0u8; 32];
        commitment.copy_from_slice(&bytes[..32]);

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[32..PREFIX_LEN]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let end = PREFIX_LEN
            .checked_add(len)
            .and_then(|n| n.checked_add(SUFFIX_LEN))
            .ok_or(PrivacyError::MalformedRecord("length overflow"))?;
        if bytes.len() < end {
            return Err(PrivacyError::MalformedRecord("truncated body"));
        }

        let ciphertext = bytes[PREFIX_LEN..PREFIX_LEN + len].to_vec();
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&bytes[end - SUFFIX_LEN..end]);

        Ok((
            Self {
                commitment: Commitment(commitment),
                ciphertext,
                index: u64::from_le_bytes(index_bytes),
            },
            end,
        ))
    }

    /// Decode exactly one record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (record, used) = Self::decode_prefix(bytes)?;
        if used != bytes.len() {
            return Err(PrivacyError::MalformedRecord("trailing bytes"));
        }
        Ok(record)
    }
}

/// Decode a concatenated stream of records
pub fn decode_records(mut bytes: &[u8]) -> Result<Vec<PublishedRecord>> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        let (record, used) = PublishedRecord::decode_prefix(bytes)?;
        records.push(record);
        bytes = &bytes[used..];
    }
    Ok(records)
}
