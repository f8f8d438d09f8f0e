//! Mirror Service
//!
//! One tokio task owns the replica. Every mutation goes through it, so the
//! tree itself needs no lock.
//!
//! ```text
//! ┌────────────┐  notices   ┌─────────────────────────────┐
//! │ Processor  │───────────▶│                             │
//! └────────────┘            │        mirror task          │   spawn_blocking
//! ┌────────────┐  commands  │  MirrorTree  pending queue  │─────────────────┐
//! │  Clients   │───────────▶│  resync flag + follow-up    │◀── rebuilt tree ┘
//! └────────────┘            └─────────────────────────────┘
//!                                   ▲ interval tick
//! ```
//!
//! Reconciliation builds a fresh tree off-task and swaps it in. Notices that
//! land while a rebuild runs are replayed onto the new tree, and a failed
//! rebuild leaves the current tree untouched.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use shroud_config::ShroudConfig;
use shroud_privacy::{Commitment, DEFAULT_HEIGHT, PublishedRecord};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::source::CommitmentSource;
use super::tree::{MirrorProof, MirrorTree};
use crate::ledger::PoolAccount;
use crate::processor::CommitmentNotice;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub height: usize,
    /// Period of the reconciliation loop; the first run starts at boot
    pub resync_interval: Duration,
    pub command_buffer: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            height: DEFAULT_HEIGHT,
            resync_interval: Duration::from_secs(60),
            command_buffer: 1000,
        }
    }
}

impl MirrorConfig {
    /// Mirror settings for an existing pool.
    ///
    /// The tree height always comes from the pool's stored accumulator so the
    /// replica's roots stay in the processor's history.
    pub fn for_pool(config: &ShroudConfig, pool: &PoolAccount) -> Self {
        let height = pool.accumulator.height as usize;
        if height != config.pool.height {
            warn!(
                "pool.height = {} ignored; pool {} was created at height {}",
                config.pool.height, pool.authority, height
            );
        }
        Self {
            height,
            resync_interval: Duration::from_secs(config.mirror.resync_interval_secs.max(1)),
            command_buffer: config.mirror.command_buffer.max(1),
        }
    }
}

/// Snapshot of the replica
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorStatus {
    pub size: u64,
    pub root: [u8; 32],
    pub pending: usize,
    pub resync_in_flight: bool,
    /// `None` until the first reconciliation finishes
    pub last_resync_ok: Option<bool>,
}

// ============================================================================
// Service state
// ============================================================================

type ResyncWaiter = oneshot::Sender<std::result::Result<(), String>>;

enum MirrorCommand {
    Notify(CommitmentNotice, oneshot::Sender<Result<bool>>),
    Resync {
        accepted: oneshot::Sender<()>,
        done: Option<ResyncWaiter>,
    },
    PathTo(u64, oneshot::Sender<Result<MirrorProof>>),
    PathFor(Commitment, oneshot::Sender<Option<MirrorProof>>),
    Root(oneshot::Sender<[u8; 32]>),
    Status(oneshot::Sender<MirrorStatus>),
    Records(oneshot::Sender<Vec<PublishedRecord>>),
    Shutdown,
}

struct MirrorState<S: CommitmentSource> {
    tree: MirrorTree,
    source: Arc<S>,
    height: usize,
    rebuilt_tx: mpsc::Sender<std::result::Result<MirrorTree, String>>,
    resync_in_flight: bool,
    follow_up: bool,
    /// Notices applied while a rebuild runs
    replay: Vec<PublishedRecord>,
    waiting: Vec<ResyncWaiter>,
    waiting_follow_up: Vec<ResyncWaiter>,
    last_resync_ok: Option<bool>,
}

impl<S: CommitmentSource> MirrorState<S> {
    fn apply(&mut self, record: PublishedRecord) -> Result<bool> {
        if self.resync_in_flight {
            self.replay.push(record.clone());
        }
        Ok(self.tree.add_commitment(record)?)
    }

    /// Start a rebuild, or fold the request into the one follow-up run
    fn request_resync(&mut self, waiter: Option<ResyncWaiter>) {
        if self.resync_in_flight {
            self.follow_up = true;
            self.waiting_follow_up.extend(waiter);
            debug!("Mirror resync already running, coalescing request");
            return;
        }
        self.waiting.extend(waiter);
        self.start_resync();
    }

    fn start_resync(&mut self) {
        self.resync_in_flight = true;
        self.replay.clear();

        let source = self.source.clone();
        let height = self.height;
        let rebuilt_tx = self.rebuilt_tx.clone();
        tokio::spawn(async move {
            let rebuilt = tokio::task::spawn_blocking(move || -> Result<MirrorTree> {
                let records = source.load_records()?;
                Ok(MirrorTree::from_records(height, records)?)
            })
            .await;

            let result = match rebuilt {
                Ok(Ok(tree)) => Ok(tree),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(e) => Err(format!("rebuild task failed: {}", e)),
            };
            let _ = rebuilt_tx.send(result).await;
        });
    }

    fn finish_resync(&mut self, result: std::result::Result<MirrorTree, String>) {
        self.resync_in_flight = false;
        let replay = std::mem::take(&mut self.replay);

        let outcome = match result {
            Ok(mut tree) => {
                for record in replay {
                    if let Err(e) = tree.add_commitment(record) {
                        warn!("Mirror failed to replay notice after resync: {}", e);
                    }
                }
                info!(
                    "Mirror resynced: {} leaves, {} pending",
                    tree.len(),
                    tree.pending_len()
                );
                self.tree = tree;
                self.last_resync_ok = Some(true);
                Ok(())
            }
            Err(e) => {
                warn!("Mirror resync failed, keeping previous tree: {}", e);
                self.last_resync_ok = Some(false);
                Err(e)
            }
        };

        for waiter in self.waiting.drain(..) {
            let _ = waiter.send(outcome.clone());
        }

        if self.follow_up {
            self.follow_up = false;
            self.waiting = std::mem::take(&mut self.waiting_follow_up);
            self.start_resync();
        }
    }

    fn status(&self) -> MirrorStatus {
        MirrorStatus {
            size: self.tree.len(),
            root: self.tree.root(),
            pending: self.tree.pending_len(),
            resync_in_flight: self.resync_in_flight,
            last_resync_ok: self.last_resync_ok,
        }
    }
}

async fn next_notice(
    notices: &mut Option<mpsc::Receiver<CommitmentNotice>>,
) -> Option<CommitmentNotice> {
    match notices {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn notice_record(notice: CommitmentNotice) -> PublishedRecord {
    PublishedRecord::new(notice.commitment, notice.ciphertext, notice.index)
}

// ============================================================================
// Async Mirror Service
// ============================================================================

/// Handle to the mirror task
#[derive(Clone)]
pub struct MirrorService {
    command_tx: mpsc::Sender<MirrorCommand>,
}

impl MirrorService {
    /// Spawn the mirror task. `notices` is the processor's notification
    /// channel, if one is wired.
    pub fn start<S: CommitmentSource>(
        source: Arc<S>,
        config: MirrorConfig,
        notices: Option<mpsc::Receiver<CommitmentNotice>>,
    ) -> Result<Self> {
        let (command_tx, mut command_rx) = mpsc::channel::<MirrorCommand>(config.command_buffer);
        let (rebuilt_tx, mut rebuilt_rx) = mpsc::channel(4);

        let mut state = MirrorState {
            tree: MirrorTree::new(config.height).context("invalid mirror tree height")?,
            source,
            height: config.height,
            rebuilt_tx,
            resync_in_flight: false,
            follow_up: false,
            replay: Vec::new(),
            waiting: Vec::new(),
            waiting_follow_up: Vec::new(),
            last_resync_ok: None,
        };
        let mut notices = notices;

        tokio::spawn(async move {
            let mut resync_tick = tokio::time::interval(config.resync_interval);
            resync_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    Some(result) = rebuilt_rx.recv() => {
                        state.finish_resync(result);
                    }
                    _ = resync_tick.tick() => {
                        // Boot and periodic reconciliation
                        state.request_resync(None);
                    }
                    Some(notice) = next_notice(&mut notices) => {
                        if let Err(e) = state.apply(notice_record(notice)) {
                            warn!("Mirror could not apply notice: {}", e);
                        }
                    }
                    cmd = command_rx.recv() => {
                        match cmd {
                            Some(MirrorCommand::Notify(notice, reply)) => {
                                let _ = reply.send(state.apply(notice_record(notice)));
                            }
                            Some(MirrorCommand::Resync { accepted, done }) => {
                                state.request_resync(done);
                                let _ = accepted.send(());
                            }
                            Some(MirrorCommand::PathTo(index, reply)) => {
                                let _ = reply.send(state.tree.path_to(index).map_err(Into::into));
                            }
                            Some(MirrorCommand::PathFor(commitment, reply)) => {
                                let _ = reply.send(state.tree.path_for(&commitment));
                            }
                            Some(MirrorCommand::Root(reply)) => {
                                let _ = reply.send(state.tree.root());
                            }
                            Some(MirrorCommand::Status(reply)) => {
                                let _ = reply.send(state.status());
                            }
                            Some(MirrorCommand::Records(reply)) => {
                                let _ = reply.send(state.tree.records());
                            }
                            Some(MirrorCommand::Shutdown) | None => {
                                break;
                            }
                        }
                    }
                }
            }

            info!("Mirror service stopped");
        });

        Ok(Self { command_tx })
    }

    async fn send(&self, command: MirrorCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("mirror service unavailable"))
    }

    /// Apply one commitment notice; `false` if it was already known
    pub async fn notify(&self, notice: CommitmentNotice) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MirrorCommand::Notify(notice, reply_tx)).await?;
        reply_rx.await.context("mirror service crashed")?
    }

    /// Queue a reconciliation without waiting for it to run
    pub async fn request_resync(&self) -> Result<()> {
        let (accepted_tx, accepted_rx) = oneshot::channel();
        self.send(MirrorCommand::Resync {
            accepted: accepted_tx,
            done: None,
        })
        .await?;
        accepted_rx.await.context("mirror service crashed")
    }

    /// Reconcile and wait for the run that covers this request
    pub async fn resync(&self) -> Result<()> {
        let (accepted_tx, _accepted_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        self.send(MirrorCommand::Resync {
            accepted: accepted_tx,
            done: Some(done_tx),
        })
        .await?;
        done_rx
            .await
            .context("mirror service crashed")?
            .map_err(|e| anyhow::anyhow!("mirror resync failed: {}", e))
    }

    /// Membership path for the leaf at `index`, against the current root
    pub async fn path_to(&self, index: u64) -> Result<MirrorProof> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MirrorCommand::PathTo(index, reply_tx)).await?;
        reply_rx.await.context("mirror service crashed")?
    }

    pub async fn path_for(&self, commitment: Commitment) -> Result<Option<MirrorProof>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MirrorCommand::PathFor(commitment, reply_tx))
            .await?;
        reply_rx.await.context("mirror service crashed")
    }

    pub async fn root(&self) -> Result<[u8; 32]> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MirrorCommand::Root(reply_tx)).await?;
        reply_rx.await.context("mirror service crashed")
    }

    pub async fn status(&self) -> Result<MirrorStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MirrorCommand::Status(reply_tx)).await?;
        reply_rx.await.context("mirror service crashed")
    }

    /// Published records for ownership scans
    pub async fn records(&self) -> Result<Vec<PublishedRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(MirrorCommand::Records(reply_tx)).await?;
        reply_rx.await.context("mirror service crashed")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(MirrorCommand::Shutdown).await
    }
}
