//! Field Elements
//!
//! Every hash, key and public amount lives in the BN254 scalar field.
//! On the wire a field element is 32 bytes, big-endian, which is the
//! layout the proof's public inputs use.

pub use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};

/// Encoded size of a field element
pub const FIELD_BYTES: usize = 32;

/// Encode a field element as 32 big-endian bytes
pub fn to_bytes(f: &Fr) -> [u8; FIELD_BYTES] {
    let bytes = f.into_bigint().to_bytes_be();
    let mut arr = [0u8; FIELD_BYTES];
    arr[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    arr
}

/// Decode 32 big-endian bytes, reducing modulo P
pub fn from_bytes(bytes: &[u8; FIELD_BYTES]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// True if the bytes are already reduced (decode then encode is the identity)
pub fn is_canonical(bytes: &[u8; FIELD_BYTES]) -> bool {
    to_bytes(&from_bytes(bytes)) == *bytes
}

/// Map a signed integer into the field as `(v + P) mod P`
pub fn signed_to_field(v: i128) -> Fr {
    if v >= 0 {
        Fr::from(v as u128)
    } else {
        -Fr::from(v.unsigned_abs())
    }
}
