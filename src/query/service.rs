//! Paginated block and transaction listings.
//!
//! The store answers whenever it can, with exact totals. When it fails, the
//! same page is rebuilt from the chain source: blocks map straight onto the
//! height range, transactions are collected by walking back from the head in
//! small batches. The transaction total in that mode is an extrapolation from
//! the scanned window (`collected / blocks_scanned * (head + 1)`) and is
//! flagged `estimated`; it can differ between calls and from the store count.

use super::{DataSource, Page, PageRequest, Pagination};
use crate::chain::{
    BlockLookup, ChainBlock, ChainSource, ChainTransaction, FullBlockError, fetch_full_block,
};
use crate::error::{QueryError, SourceError, StoreError};
use crate::repository::{Block, Transaction};
use crate::store::LedgerStore;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Blocks fetched per backward step while collecting transactions.
    pub batch_size: u64,
    /// Upper bound on block fetches in flight.
    pub fetch_concurrency: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            fetch_concurrency: 5,
        }
    }
}

pub struct QueryService {
    store: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainSource>,
    config: FallbackConfig,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainSource>,
        config: FallbackConfig,
    ) -> Self {
        Self {
            store,
            chain,
            config,
        }
    }

    pub async fn list_transactions(
        &self,
        request: PageRequest,
    ) -> Result<Page<Transaction>, QueryError> {
        match self.transactions_from_store(request).await {
            Ok(page) => Ok(page),
            Err(store) => {
                warn!(
                    "Ledger store unavailable ({}), listing transactions from chain",
                    store
                );
                self.transactions_from_chain(request)
                    .await
                    .map_err(|chain| QueryError::FallbackFailed { store, chain })
            }
        }
    }

    pub async fn list_blocks(&self, request: PageRequest) -> Result<Page<Block>, QueryError> {
        match self.blocks_from_store(request).await {
            Ok(page) => Ok(page),
            Err(store) => {
                warn!("Ledger store unavailable ({}), listing blocks from chain", store);
                self.blocks_from_chain(request)
                    .await
                    .map_err(|chain| QueryError::FallbackFailed { store, chain })
            }
        }
    }

    async fn transactions_from_store(
        &self,
        request: PageRequest,
    ) -> Result<Page<Transaction>, StoreError> {
        let total = self.store.count_transactions().await?;
        let items = self
            .store
            .transactions_page(request.page_size(), request.offset())
            .await?;
        Ok(Page {
            items,
            pagination: Pagination::exact(request, total),
            source: DataSource::Store,
        })
    }

    async fn blocks_from_store(&self, request: PageRequest) -> Result<Page<Block>, StoreError> {
        let total = self.store.count_blocks().await?;
        let items = self
            .store
            .blocks_page(request.page_size(), request.offset())
            .await?;
        Ok(Page {
            items,
            pagination: Pagination::exact(request, total),
            source: DataSource::Store,
        })
    }

    /// Walks back from the head until the requested page is covered or block
    /// 0 has been scanned. Never reads more than `head + 1` blocks.
    pub async fn transactions_from_chain(
        &self,
        request: PageRequest,
    ) -> Result<Page<Transaction>, SourceError> {
        let head = self.chain.latest_block_number().await?;
        let batch_size = self.config.batch_size.max(1);
        let wanted = request.end();

        let mut collected: Vec<Transaction> = Vec::new();
        let mut blocks_scanned = 0u64;
        let mut batch_top = Some(head);

        while let Some(top) = batch_top {
            if collected.len() as u64 >= wanted {
                break;
            }
            let bottom = top.saturating_sub(batch_size - 1);
            let blocks = self.fetch_full_range(bottom, top).await?;
            for (block, transactions) in blocks.into_iter().flatten() {
                collected.extend(
                    transactions
                        .iter()
                        .enumerate()
                        .map(|(position, tx)| Transaction::from_chain(tx, &block, position)),
                );
            }
            blocks_scanned += top - bottom + 1;
            batch_top = bottom.checked_sub(1);
        }

        collected.sort_by(|a, b| {
            b.block_number
                .cmp(&a.block_number)
                .then(a.transaction_index.cmp(&b.transaction_index))
        });

        let found = collected.len() as u64;
        let pagination = if batch_top.is_none() {
            Pagination::exact(request, found)
        } else {
            Pagination::estimated(request, estimate_total(found, blocks_scanned, head))
        };
        debug!(
            "Chain fallback scanned {} blocks below head {}, {} transactions",
            blocks_scanned, head, found
        );

        let items = collected
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.page_size() as usize)
            .collect();

        Ok(Page {
            items,
            pagination,
            source: DataSource::Chain,
        })
    }

    /// Heights are contiguous, so the page is a direct number range and the
    /// total (`head + 1`) is exact.
    pub async fn blocks_from_chain(&self, request: PageRequest) -> Result<Page<Block>, SourceError> {
        let head = self.chain.latest_block_number().await?;
        let total = head + 1;

        let items = match head.checked_sub(request.offset()) {
            Some(top) => {
                let bottom = top.saturating_sub(request.page_size() - 1);
                let chain = Arc::clone(&self.chain);
                stream::iter((bottom..=top).rev())
                    .map(move |number| {
                        let chain = Arc::clone(&chain);
                        async move { chain.block(BlockLookup::Number(number), false).await }
                    })
                    .buffered(self.config.fetch_concurrency.max(1))
                    .try_collect::<Vec<_>>()
                    .await?
                    .into_iter()
                    .flatten()
                    .map(|block| Block::from_chain(&block))
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(Page {
            items,
            pagination: Pagination::exact(request, total),
            source: DataSource::Chain,
        })
    }

    /// Fetches `top` down to `bottom` with full transactions. Blocks the source
    /// does not return are `None`.
    async fn fetch_full_range(
        &self,
        bottom: u64,
        top: u64,
    ) -> Result<Vec<Option<FullBlock>>, SourceError> {
        let chain = Arc::clone(&self.chain);
        stream::iter((bottom..=top).rev())
            .map(move |number| {
                let chain = Arc::clone(&chain);
                async move {
                    fetch_full_block(chain.as_ref(), number)
                        .await
                        .map_err(unresolved_as_malformed)
                }
            })
            .buffered(self.config.fetch_concurrency.max(1))
            .try_collect()
            .await
    }
}

type FullBlock = (ChainBlock, Vec<ChainTransaction>);

pub(crate) fn unresolved_as_malformed(error: FullBlockError) -> SourceError {
    match error {
        FullBlockError::Source(error) => error,
        FullBlockError::Unresolved(hash) => SourceError::Malformed {
            method: "eth_getTransactionByHash",
            message: format!("block lists transaction {hash:?} but the node does not return it"),
        },
    }
}

/// Extrapolates the chain-wide transaction count from the blocks scanned.
/// Never reports fewer transactions than were actually seen.
fn estimate_total(found: u64, blocks_scanned: u64, head: u64) -> u64 {
    if blocks_scanned == 0 {
        return found;
    }
    let extrapolated = found as u128 * (head as u128 + 1) / blocks_scanned as u128;
    u64::try_from(extrapolated).unwrap_or(u64::MAX).max(found)
}
