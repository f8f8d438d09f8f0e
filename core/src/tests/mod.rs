mod e2e;

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use shroud_keypair::{Keypair, Pubkey};
use shroud_privacy::{
    Commitment, EncryptionKey, ExtData, Nullifier, Proof, PublicInputs, Utxo, UtxoKeypair, field,
};

use crate::ledger::{LedgerBatch, LedgerStore, MemoryLedger};
use crate::processor::{ProcessorConfig, TransactRequest, TransactionProcessor};
use crate::verifier::MockVerifier;

/// A pool owner plus one wallet that deposits into and withdraws from it
pub(crate) struct Harness {
    pub processor: TransactionProcessor,
    pub store: Arc<dyn LedgerStore>,
    pub authority: Pubkey,
    pub asset: Pubkey,
    pub depositor: Pubkey,
    pub recipient: Pubkey,
    pub key: EncryptionKey,
    pub keypair: UtxoKeypair,
    pub rng: StdRng,
}

impl Harness {
    pub fn new(config: ProcessorConfig) -> Self {
        Self::with_store(Arc::new(MemoryLedger::new()), config)
    }

    pub fn with_store(store: Arc<dyn LedgerStore>, config: ProcessorConfig) -> Self {
        let processor =
            TransactionProcessor::new(store.clone(), Box::new(MockVerifier::new()), config);
        Self::with_processor(processor, store)
    }

    pub fn with_processor(processor: TransactionProcessor, store: Arc<dyn LedgerStore>) -> Self {
        let wallet = Keypair::from_seed(&[7u8; 32]);
        let key = EncryptionKey::derive(&wallet);
        let keypair = key.utxo_keypair(b"default");

        let harness = Self {
            processor,
            store,
            authority: Pubkey::new([1u8; 32]),
            asset: Pubkey::new([2u8; 32]),
            depositor: wallet.pubkey(),
            recipient: Pubkey::new([3u8; 32]),
            key,
            keypair,
            rng: StdRng::seed_from_u64(42),
        };
        harness
            .processor
            .initialize(harness.authority, harness.asset)
            .unwrap();
        harness
    }

    pub fn fund(&self, account: Pubkey, amount: u64) {
        self.store
            .apply_batch(LedgerBatch {
                balances: vec![(account, amount)],
                ..Default::default()
            })
            .unwrap();
    }

    pub fn balance(&self, account: &Pubkey) -> u64 {
        self.store.balance(account).unwrap()
    }

    pub fn custody(&self) -> Pubkey {
        crate::ledger::slots::custody_address(&self.authority)
    }

    pub fn fee_recipient(&self) -> Pubkey {
        crate::ledger::slots::fee_recipient_address(&self.authority)
    }

    pub fn current_root(&self) -> [u8; 32] {
        self.processor
            .pool(&self.authority)
            .unwrap()
            .unwrap()
            .accumulator
            .root
    }

    pub fn next_index(&self) -> u64 {
        self.processor
            .pool(&self.authority)
            .unwrap()
            .unwrap()
            .accumulator
            .next_index
    }

    pub fn utxo(&mut self, amount: u64) -> Utxo {
        Utxo::new(amount, self.keypair.clone(), &mut self.rng)
    }

    pub fn dummy(&mut self) -> Utxo {
        Utxo::dummy(self.keypair.clone(), &mut self.rng)
    }

    /// Build a request against the current root, with outputs encrypted
    /// for the indices they will land on
    pub fn build(
        &mut self,
        inputs: [&Utxo; 2],
        outputs: [&Utxo; 2],
        ext_amount: i64,
        fee: u64,
    ) -> TransactRequest {
        let root = self.current_root();
        self.build_at(root, inputs, outputs, ext_amount, fee)
    }

    pub fn build_at(
        &mut self,
        root: [u8; 32],
        inputs: [&Utxo; 2],
        outputs: [&Utxo; 2],
        ext_amount: i64,
        fee: u64,
    ) -> TransactRequest {
        let first = self.next_index();
        let ext_data = ExtData {
            recipient: self.recipient,
            ext_amount,
            ciphertext_a: self.key.encrypt_utxo(outputs[0], first).unwrap(),
            ciphertext_b: self.key.encrypt_utxo(outputs[1], first + 1).unwrap(),
            fee,
        };
        let public = PublicInputs {
            root,
            public_amount: field::to_bytes(&ext_data.public_amount()),
            ext_data_hash: ext_data.hash().unwrap(),
            nullifiers: [inputs[0].nullifier(), inputs[1].nullifier()],
            commitments: [outputs[0].commitment(), outputs[1].commitment()],
        };
        request(self.authority, self.asset, self.depositor, public, ext_data)
    }

    /// Deposit `amount` (fee included) as one fresh UTXO plus a dummy.
    /// Returns the spendable output with its assigned index.
    pub fn deposit(&mut self, amount: u64, fee: u64) -> Utxo {
        let (a, b) = (self.dummy(), self.dummy());
        let out = self.utxo(amount - fee);
        let filler = self.dummy();
        let req = self.build([&a, &b], [&out, &filler], amount as i64, fee);
        let receipt = self.processor.transact(&req).unwrap();
        out.with_index(receipt.indices[0])
    }

    /// Re-sign `inputs` after a test tampered with them
    pub fn reprove(req: &mut TransactRequest, inputs: PublicInputs) {
        req.proof = Proof {
            proof: MockVerifier::prove(&inputs),
            inputs,
        };
    }
}

pub(crate) fn request(
    authority: Pubkey,
    asset: Pubkey,
    depositor: Pubkey,
    inputs: PublicInputs,
    ext_data: ExtData,
) -> TransactRequest {
    let proof = Proof {
        proof: MockVerifier::prove(&inputs),
        inputs,
    };
    TransactRequest::new(authority, asset, depositor, proof, ext_data)
}

/// Everything a rejected transaction must leave alone
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Snapshot {
    next_index: u64,
    root: [u8; 32],
    balances: Vec<u64>,
    commitments: usize,
}

impl Harness {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            next_index: self.next_index(),
            root: self.current_root(),
            balances: [
                self.depositor,
                self.recipient,
                self.custody(),
                self.fee_recipient(),
            ]
            .iter()
            .map(|a| self.balance(a))
            .collect(),
            commitments: self.store.commitments(&self.authority).unwrap().len(),
        }
    }

    pub fn spent(&self, nullifier: &Nullifier) -> bool {
        self.store.has_nullifier(&self.authority, nullifier).unwrap()
    }

    pub fn recorded(&self, commitment: &Commitment) -> bool {
        self.store
            .commitment(&self.authority, commitment)
            .unwrap()
            .is_some()
    }
}
