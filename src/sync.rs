//! Mirrors new chain blocks into the ledger store.
//!
//! The checkpoint is never stored on its own: it is the highest block number in
//! the store, so a crash mid-run leaves nothing to repair. Each block is written
//! together with its transactions, in ascending order, and the run stops at the
//! first block it cannot fetch or persist.

use crate::chain::{ChainSource, FullBlockError, fetch_full_block};
use crate::error::SyncError;
use crate::repository::{Block, Transaction};
use crate::store::LedgerStore;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// First block mirrored into an empty store.
    pub genesis_block: u64,
    /// Upper bound on block fetches in flight during one run.
    pub fetch_concurrency: usize,
    /// Caps how far a single run advances; the next run continues from there.
    pub max_blocks_per_run: Option<u64>,
    /// Fetch each transaction's receipt so `status` is known at insert time.
    pub fetch_receipts: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            genesis_block: 0,
            fetch_concurrency: 4,
            max_blocks_per_run: None,
            fetch_receipts: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Chain head was not ahead of the checkpoint; nothing was written.
    UpToDate,
    /// Every block in the planned range was persisted.
    Completed,
    /// The chain source had no data for a block in range; the run stopped there.
    Partial,
    /// Another run was in flight; this trigger was coalesced into it.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub status: SyncStatus,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub blocks_written: usize,
    pub transactions_written: usize,
    /// Highest persisted block when the run ended.
    pub checkpoint: Option<u64>,
    /// Block the chain source did not return, for a `Partial` run.
    pub stopped_before: Option<u64>,
    pub elapsed_ms: u64,
}

impl SyncReport {
    fn new(status: SyncStatus, checkpoint: Option<u64>) -> Self {
        Self {
            status,
            from_block: None,
            to_block: None,
            blocks_written: 0,
            transactions_written: 0,
            checkpoint,
            stopped_before: None,
            elapsed_ms: 0,
        }
    }

    /// Why the run fell short of its planned range, if it did.
    pub fn shortfall(&self) -> Option<String> {
        if self.status != SyncStatus::Partial {
            return None;
        }
        let missing = self
            .stopped_before
            .map_or("a block".to_string(), |number| format!("block {number}"));
        Some(format!(
            "chain source did not return {}; synced up to {} of {}",
            missing,
            self.checkpoint
                .map_or("nothing".to_string(), |number| number.to_string()),
            self.to_block
                .map_or("nothing".to_string(), |number| number.to_string()),
        ))
    }
}

pub struct SyncEngine {
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn LedgerStore>,
    config: SyncConfig,
    run_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(chain: Arc<dyn ChainSource>, store: Arc<dyn LedgerStore>, config: SyncConfig) -> Self {
        Self {
            chain,
            store,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Runs one sync pass over `(checkpoint, head]`. At most one pass runs at a
    /// time; a call made while another is in flight returns `Skipped`.
    pub async fn run_sync(&self) -> Result<SyncReport, SyncError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            debug!("Sync already in progress, coalescing trigger");
            return Ok(SyncReport::new(SyncStatus::Skipped, None));
        };

        let started = Instant::now();
        let checkpoint = self
            .store
            .max_block_number()
            .await
            .map_err(SyncError::Checkpoint)?;
        let latest = self
            .chain
            .latest_block_number()
            .await
            .map_err(SyncError::Head)?;

        let next = checkpoint.map_or(self.config.genesis_block, |c| c + 1);
        if latest < next {
            debug!(
                "Store is up to date at {:?} (chain head {})",
                checkpoint, latest
            );
            let mut report = SyncReport::new(SyncStatus::UpToDate, checkpoint);
            report.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let end = match self.config.max_blocks_per_run {
            Some(max) if max > 0 => latest.min(next.saturating_add(max - 1)),
            _ => latest,
        };
        info!(
            "Syncing blocks {} to {} (chain head {}, checkpoint {:?})",
            next, end, latest, checkpoint
        );

        let mut report = SyncReport::new(SyncStatus::Completed, checkpoint);
        report.from_block = Some(next);
        report.to_block = Some(end);

        let mut expected_parent = match checkpoint {
            Some(number) => self
                .store
                .block_hash(number)
                .await
                .map_err(SyncError::Checkpoint)?,
            None => None,
        };

        let chain = Arc::clone(&self.chain);
        let fetch_receipts = self.config.fetch_receipts;
        let mut fetches = stream::iter(next..=end)
            .map(move |number| {
                let chain = Arc::clone(&chain);
                async move {
                    let fetched = fetch_block(chain.as_ref(), number, fetch_receipts).await;
                    (number, fetched)
                }
            })
            .buffered(self.config.fetch_concurrency.max(1));

        while let Some((number, fetched)) = fetches.next().await {
            let (block, transactions) = match fetched {
                Ok(Some(fetched)) => fetched,
                Ok(None) => {
                    warn!(
                        "Block {} not returned by chain source, stopping at checkpoint {:?}",
                        number, report.checkpoint
                    );
                    report.status = SyncStatus::Partial;
                    report.stopped_before = Some(number);
                    break;
                }
                Err(FullBlockError::Source(error)) => {
                    return Err(SyncError::Source {
                        block: number,
                        error,
                    });
                }
                Err(FullBlockError::Unresolved(hash)) => {
                    return Err(SyncError::UnresolvedTransaction {
                        block: number,
                        hash,
                    });
                }
            };

            if let Some(stored) = expected_parent.filter(|hash| *hash != block.parent_hash) {
                error!(
                    "Block {} does not extend stored block {}; possible reorg",
                    number,
                    number.saturating_sub(1)
                );
                return Err(SyncError::ParentMismatch {
                    block: number,
                    parent: block.parent_hash,
                    stored,
                });
            }

            let block_hash = block.hash;
            let outcome = self
                .store
                .persist_block(block, transactions)
                .await
                .map_err(|error| SyncError::Store {
                    block: number,
                    error,
                })?;

            expected_parent = Some(block_hash);
            report.blocks_written += outcome.blocks_written;
            report.transactions_written += outcome.transactions_written;
            report.checkpoint = Some(number);

            if number % 100 == 0 {
                info!("Persisted block {} ({} to go)", number, end - number);
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Sync run {:?}: {} blocks and {} transactions written, checkpoint {:?} in {}ms",
            report.status,
            report.blocks_written,
            report.transactions_written,
            report.checkpoint,
            report.elapsed_ms
        );
        Ok(report)
    }
}

/// Fetches block `number` and converts it into store rows.
async fn fetch_block(
    chain: &dyn ChainSource,
    number: u64,
    fetch_receipts: bool,
) -> Result<Option<(Block, Vec<Transaction>)>, FullBlockError> {
    let Some((block, transactions)) = fetch_full_block(chain, number).await? else {
        return Ok(None);
    };

    let mut rows = Vec::with_capacity(transactions.len());
    for (position, tx) in transactions.iter().enumerate() {
        let mut row = Transaction::from_chain(tx, &block, position);
        if fetch_receipts {
            row.status = chain
                .transaction_receipt(tx.hash)
                .await?
                .map(|receipt| receipt.status);
        }
        rows.push(row);
    }

    Ok(Some((Block::from_chain(&block), rows)))
}
