use std::sync::Arc;
use std::time::Duration;

use shroud_privacy::{PublishedRecord, Utxo, scan_owned};
use tempfile::TempDir;
use shroud_config::ShroudConfig;
use tokio::sync::mpsc;

use super::Harness;
use crate::ledger::{LedgerStore, RocksDbLedger};
use crate::mirror::{CommitmentSource, LedgerSource, MirrorConfig, MirrorService, MirrorStatus};
use crate::processor::{ProcessorConfig, TransactionProcessor};
use crate::verifier::MockVerifier;

const HEIGHT: usize = 8;

/// Wait until the mirror has applied `size` leaves
async fn caught_up(mirror: &MirrorService, size: u64) -> MirrorStatus {
    for _ in 0..200 {
        let status = mirror.status().await.unwrap();
        if status.size == size && status.pending == 0 {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("mirror never reached {} leaves", size);
}

/// Unspent, non-empty UTXOs the wallet can find in `records`
fn spendable(h: &Harness, records: &[PublishedRecord]) -> Vec<Utxo> {
    scan_owned(&h.key, &h.keypair, records)
        .into_iter()
        .filter(|u| u.amount > 0 && !h.spent(&u.nullifier()))
        .collect()
}

#[tokio::test]
async fn deposit_scan_withdraw_conserves_value() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn LedgerStore> = Arc::new(RocksDbLedger::open(dir.path()).unwrap());

    let (notice_tx, notice_rx) = mpsc::channel(64);
    let processor = TransactionProcessor::new(
        store.clone(),
        Box::new(MockVerifier::new()),
        ProcessorConfig {
            height: HEIGHT,
            root_history_size: 100,
        },
    )
    .with_notifier(notice_tx);
    let mut h = Harness::with_processor(processor, store.clone());
    h.fund(h.depositor, 1_000);

    let source = Arc::new(LedgerSource::new(store.clone(), h.authority));
    let mirror = MirrorService::start(
        source.clone(),
        MirrorConfig {
            height: HEIGHT,
            resync_interval: Duration::from_secs(3600),
            command_buffer: 16,
        },
        Some(notice_rx),
    )
    .unwrap();

    // Deposit 200 with a 50 fee
    h.deposit(200, 50);
    assert_eq!(h.balance(&h.depositor), 800);
    assert_eq!(h.balance(&h.custody()), 150);
    assert_eq!(h.balance(&h.fee_recipient()), 50);

    // The wallet rediscovers its note from published data alone
    let status = caught_up(&mirror, 2).await;
    assert_eq!(status.root, h.current_root());

    let records = mirror.records().await.unwrap();
    let owned = spendable(&h, &records);
    assert_eq!(owned.len(), 1);
    let note = owned[0].clone();
    assert_eq!(note.amount, 150);
    assert_eq!(note.index, Some(0));

    let proof = mirror.path_for(note.commitment()).await.unwrap().unwrap();
    assert_eq!(proof.index, 0);
    assert!(proof.path.verify(&note.commitment().0, &proof.root));

    // Withdraw 100 with a 20 fee, keeping 30 as change
    let filler_in = h.dummy();
    let (change, filler) = (h.utxo(30), h.dummy());
    let req = h.build_at(proof.root, [&note, &filler_in], [&change, &filler], -100, 20);
    let receipt = h.processor.transact(&req).unwrap();
    assert_eq!(receipt.indices, [2, 3]);

    assert_eq!(h.balance(&h.recipient), 100);
    assert_eq!(h.balance(&h.custody()), 30);
    assert_eq!(h.balance(&h.fee_recipient()), 70);

    let total: u64 = [h.depositor, h.recipient, h.custody(), h.fee_recipient()]
        .iter()
        .map(|a| h.balance(a))
        .sum();
    assert_eq!(total, 1_000);

    // Custody holds exactly the value still shielded
    let status = caught_up(&mirror, 4).await;
    assert_eq!(status.root, receipt.root);

    let records = mirror.records().await.unwrap();
    let owned = spendable(&h, &records);
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].commitment(), change.commitment());
    assert_eq!(owned[0].index, Some(2));
    assert_eq!(
        owned.iter().map(|u| u.amount).sum::<u64>(),
        h.balance(&h.custody())
    );

    // The authoritative set agrees with the notice-fed replica
    assert_eq!(source.load_records().unwrap(), records);

    mirror.shutdown().await.unwrap();
}

#[tokio::test]
async fn mirror_recovers_from_missed_notices() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn LedgerStore> = Arc::new(RocksDbLedger::open(dir.path()).unwrap());

    // No notifier: the mirror only learns through reconciliation
    let mut h = Harness::with_store(
        store.clone(),
        ProcessorConfig {
            height: HEIGHT,
            root_history_size: 100,
        },
    );
    h.fund(h.depositor, 1_000);

    let mirror = MirrorService::start(
        Arc::new(LedgerSource::new(store.clone(), h.authority)),
        MirrorConfig {
            height: HEIGHT,
            resync_interval: Duration::from_secs(3600),
            command_buffer: 16,
        },
        None,
    )
    .unwrap();

    h.deposit(100, 0);
    h.deposit(40, 5);

    mirror.resync().await.unwrap();
    let status = mirror.status().await.unwrap();
    assert_eq!(status.size, 4);
    assert_eq!(status.root, h.current_root());
    assert_eq!(status.last_resync_ok, Some(true));

    for index in 0..4 {
        let proof = mirror.path_to(index).await.unwrap();
        assert_eq!(proof.root, h.current_root());
    }
    assert!(mirror.path_to(4).await.is_err());

    mirror.shutdown().await.unwrap();
}

#[tokio::test]
async fn mirror_follows_pool_height_over_config() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn LedgerStore> = Arc::new(RocksDbLedger::open(dir.path()).unwrap());

    let mut h = Harness::with_store(
        store.clone(),
        ProcessorConfig {
            height: HEIGHT,
            root_history_size: 100,
        },
    );
    h.fund(h.depositor, 1_000);
    h.deposit(100, 0);

    // Configured height drifted since the pool was created
    let mut config = ShroudConfig::default();
    config.pool.height = HEIGHT + 2;
    config.mirror.resync_interval_secs = 3600;
    let pool = h.processor.pool(&h.authority).unwrap().unwrap();
    let mirror_config = MirrorConfig::for_pool(&config, &pool);
    assert_eq!(mirror_config.height, HEIGHT);

    let mirror = MirrorService::start(
        Arc::new(LedgerSource::new(store.clone(), h.authority)),
        mirror_config,
        None,
    )
    .unwrap();
    mirror.resync().await.unwrap();
    assert_eq!(mirror.status().await.unwrap().root, h.current_root());

    let records = mirror.records().await.unwrap();
    let note = spendable(&h, &records)[0].clone();
    let proof = mirror.path_for(note.commitment()).await.unwrap().unwrap();

    let filler_in = h.dummy();
    let (change, filler) = (h.utxo(0), h.dummy());
    let req = h.build_at(proof.root, [&note, &filler_in], [&change, &filler], -100, 0);
    h.processor.transact(&req).unwrap();
    assert_eq!(h.balance(&h.recipient), 100);

    mirror.shutdown().await.unwrap();
}
