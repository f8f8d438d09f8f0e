//! Proof verification
//!
//! The processor treats the prover as a black box and only asks whether a
//! proof blob holds for a set of public inputs.
//!
//! ```text
//! public inputs (verifier order):
//!   [root, public_amount, ext_data_hash, nullifier_a, nullifier_b,
//!    commitment_a, commitment_b]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use ark_serialize::CanonicalDeserialize;
use ark_snark::SNARK;
use log::debug;
use shroud_config::{VerifierConfig, VerifierMode};
use shroud_privacy::PublicInputs;

const MOCK_PROOF_DOMAIN: &[u8] = b"shroud-mock-proof";

/// Trait for proof verification
pub trait ProofVerifier: Send + Sync {
    /// `Ok(false)` for a proof that does not hold; `Err` only when the
    /// verifier itself cannot run
    fn verify(&self, inputs: &PublicInputs, proof: &[u8]) -> Result<bool>;
}

// ============================================================================
// Mock Verifier
// ============================================================================

/// Accepts exactly `blake3(domain || public inputs)`.
///
/// Stands in for a circuit during development and tests. It binds the
/// proof to its inputs but proves nothing about the witness.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockVerifier;

impl MockVerifier {
    pub fn new() -> Self {
        Self
    }

    /// The only blob this verifier accepts for `inputs`
    pub fn prove(inputs: &PublicInputs) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(MOCK_PROOF_DOMAIN);
        hasher.update(&inputs.to_bytes());
        hasher.finalize().as_bytes().to_vec()
    }
}

impl ProofVerifier for MockVerifier {
    fn verify(&self, inputs: &PublicInputs, proof: &[u8]) -> Result<bool> {
        Ok(proof == Self::prove(inputs).as_slice())
    }
}

// ============================================================================
// Groth16 Verifier
// ============================================================================

/// Groth16 over BN254 using arkworks
pub struct Groth16Verifier {
    prepared: PreparedVerifyingKey<Bn254>,
    vk_hash: [u8; 32],
}

impl Groth16Verifier {
    /// Build from a compressed verifying key
    pub fn from_bytes(vk_bytes: &[u8]) -> Result<Self> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(vk_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize verifying key: {}", e))?;
        Self::from_key(&vk, blake3::hash(vk_bytes).into())
    }

    /// Load a compressed verifying key from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let vk_bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read verifying key from {}", path.display()))?;
        Self::from_bytes(&vk_bytes)
    }

    fn from_key(vk: &VerifyingKey<Bn254>, vk_hash: [u8; 32]) -> Result<Self> {
        let prepared = Groth16::<Bn254>::process_vk(vk)
            .map_err(|e| anyhow::anyhow!("Failed to prepare verifying key: {}", e))?;
        Ok(Self { prepared, vk_hash })
    }

    /// blake3 of the compressed verifying key
    pub fn vk_hash(&self) -> [u8; 32] {
        self.vk_hash
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(&self, inputs: &PublicInputs, proof: &[u8]) -> Result<bool> {
        let proof = match Proof::<Bn254>::deserialize_compressed(proof) {
            Ok(proof) => proof,
            Err(e) => {
                debug!("Rejecting malformed Groth16 proof: {}", e);
                return Ok(false);
            }
        };

        let public: [Fr; shroud_privacy::proof::PUBLIC_INPUT_COUNT] = inputs.to_field_elements();
        Groth16::<Bn254>::verify_with_processed_vk(&self.prepared, &public, &proof)
            .map_err(|e| anyhow::anyhow!("Groth16 verification error: {}", e))
    }
}

/// Build the verifier selected in config
pub fn from_config(config: &VerifierConfig) -> Result<Box<dyn ProofVerifier>> {
    match config.mode {
        VerifierMode::Mock => Ok(Box::new(MockVerifier::new())),
        VerifierMode::Groth16 => {
            let path = config
                .verifying_key_path
                .as_deref()
                .context("verifier.mode = groth16 requires verifier.verifying_key_path")?;
            Ok(Box::new(Groth16Verifier::from_file(path)?))
        }
    }
}
