//! Deterministic slot addressing
//!
//! Every protocol account lives at `sha256(tag || authority || key?)`. For
//! nullifiers and commitments the slot's existence is the marker itself.

use shroud_keypair::Pubkey;
use shroud_privacy::{Commitment, Nullifier};

pub const POOL_TAG: &[u8] = b"pool";
pub const CUSTODY_TAG: &[u8] = b"custody";
pub const FEE_RECIPIENT_TAG: &[u8] = b"fee_recipient";
pub const NULLIFIER_TAG: &[u8] = b"nullifier";
pub const COMMITMENT_TAG: &[u8] = b"commitment";

pub fn pool_address(authority: &Pubkey) -> Pubkey {
    Pubkey::derive(&[POOL_TAG, authority.as_bytes()])
}

/// Account holding every deposited unit until it is withdrawn
pub fn custody_address(authority: &Pubkey) -> Pubkey {
    Pubkey::derive(&[CUSTODY_TAG, authority.as_bytes()])
}

pub fn fee_recipient_address(authority: &Pubkey) -> Pubkey {
    Pubkey::derive(&[FEE_RECIPIENT_TAG, authority.as_bytes()])
}

/// Both input positions share this namespace
pub fn nullifier_address(authority: &Pubkey, nullifier: &Nullifier) -> Pubkey {
    Pubkey::derive(&[NULLIFIER_TAG, authority.as_bytes(), nullifier.as_bytes()])
}

pub fn commitment_address(authority: &Pubkey, commitment: &Commitment) -> Pubkey {
    Pubkey::derive(&[COMMITMENT_TAG, authority.as_bytes(), commitment.as_bytes()])
}
