use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use shroud_config::ShroudConfig;
use shroud_core::ledger::{LedgerStore, RocksDbLedger};
use shroud_core::mirror::{LedgerSource, MirrorConfig, MirrorService};
use shroud_core::processor::{ProcessorConfig, TransactionProcessor};
use shroud_core::verifier;
use shroud_keypair::{Keypair, Pubkey};
use tokio::sync::mpsc;

fn parse_pubkey(field: &str, value: Option<&str>, dev_mode: bool) -> Result<Pubkey> {
    match value {
        Some(s) => s
            .parse()
            .with_context(|| format!("pool.{} is not a base58 pubkey", field)),
        None if dev_mode => {
            let key = Keypair::new_random().pubkey();
            warn!("pool.{} not set, using throwaway dev key {}", field, key);
            Ok(key)
        }
        None => anyhow::bail!("pool.{} must be set outside dev mode", field),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Shroud node starting...");

    let config = ShroudConfig::load()?;
    config.validate()?;
    let dev_mode = config.features.dev_mode;

    let store: Arc<dyn LedgerStore> = Arc::new(
        RocksDbLedger::open(&config.database.path)
            .with_context(|| format!("failed to open ledger at {}", config.database.path))?,
    );
    info!("Ledger opened at {}", config.database.path);

    let authority = parse_pubkey("authority", config.pool.authority.as_deref(), dev_mode)?;
    let asset = parse_pubkey("asset", config.pool.asset.as_deref(), dev_mode)?;

    let verifier = verifier::from_config(&config.verifier)?;
    info!("Proof verifier: {:?}", config.verifier.mode);

    let (notice_tx, notice_rx) = mpsc::channel(config.mirror.command_buffer.max(1));
    let processor = TransactionProcessor::new(
        store.clone(),
        verifier,
        ProcessorConfig::from(&config.pool),
    )
    .with_notifier(notice_tx);

    let pool = match processor.pool(&authority)? {
        Some(pool) => {
            if pool.asset != asset {
                warn!(
                    "Configured asset {} differs from pool asset {}",
                    asset, pool.asset
                );
            }
            info!(
                "Pool {} loaded with {} leaves",
                authority, pool.accumulator.next_index
            );
            pool
        }
        None if dev_mode => processor.initialize(authority, asset)?,
        None => anyhow::bail!(
            "no pool initialized for authority {} (enable features.dev_mode to create one)",
            authority
        ),
    };

    let mirror_config = MirrorConfig::for_pool(&config, &pool);
    let status_interval = mirror_config.resync_interval;
    let mirror = MirrorService::start(
        Arc::new(LedgerSource::new(store.clone(), authority)),
        mirror_config,
        Some(notice_rx),
    )?;
    info!("Mirror service started");

    let mut ticker = tokio::time::interval(status_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match mirror.status().await {
                    Ok(status) => info!(
                        "Mirror: {} leaves, root {}, {} pending, last resync {:?}",
                        status.size,
                        hex::encode(status.root),
                        status.pending,
                        status.last_resync_ok
                    ),
                    Err(e) => {
                        error!("Mirror status failed: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Err(e) = mirror.shutdown().await {
        warn!("Mirror shutdown: {}", e);
    }
    // The processor owns the notifier; dropping it closes the notice channel
    drop(processor);
    info!("Shroud node stopped");
    Ok(())
}
