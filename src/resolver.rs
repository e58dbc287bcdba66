//! Live per-address facts.
//!
//! There is no address-indexed transaction table, so activity is derived by
//! scanning a fixed window of the most recent blocks. A transaction at block
//! `L` is visible iff `head - L < window`; anything older is simply not
//! reported.

use crate::chain::{ChainBlock, ChainSource, ChainTransaction, fetch_full_block};
use crate::error::{ResolveError, SourceError};
use crate::query::service::unresolved_as_malformed;
use crate::query::{DataSource, Page, PageRequest, Pagination};
use crate::repository::{AddressRecord, Transaction};
use crate::store::LedgerStore;
use alloy_primitives::Address;
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Blocks scanned for first/last/creation transactions.
    pub activity_window: u64,
    /// Blocks scanned when listing an address's recent transactions.
    pub recent_tx_window: u64,
    pub fetch_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            activity_window: 100,
            recent_tx_window: 20,
            fetch_concurrency: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTx {
    pub hash: alloy_primitives::B256,
    pub block_number: u64,
    pub timestamp: u64,
}

impl ActivityTx {
    fn new(tx: &ChainTransaction, block: &ChainBlock) -> Self {
        Self {
            hash: tx.hash,
            block_number: block.number,
            timestamp: block.timestamp,
        }
    }
}

/// Blocks `from_block..=to_block` were scanned for activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanWindow {
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressActivity {
    pub address: Address,
    /// Wei, decimal.
    pub balance: String,
    pub is_contract: bool,
    /// Account nonce.
    pub tx_count: u64,
    pub first_tx: Option<ActivityTx>,
    pub last_tx: Option<ActivityTx>,
    pub creation_tx: Option<ActivityTx>,
    pub window: Option<ScanWindow>,
}

pub struct AddressResolver {
    chain: Arc<dyn ChainSource>,
    cache: Option<Arc<dyn LedgerStore>>,
    config: ResolverConfig,
}

impl AddressResolver {
    pub fn new(chain: Arc<dyn ChainSource>, config: ResolverConfig) -> Self {
        Self {
            chain,
            cache: None,
            config,
        }
    }

    /// Writes resolved balances through to the store's address cache.
    pub fn with_cache(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub async fn resolve(&self, address: Address) -> Result<AddressActivity, ResolveError> {
        let (balance, code, tx_count) = tokio::try_join!(
            self.chain.balance(address),
            self.chain.code(address),
            self.chain.transaction_count(address),
        )?;
        let is_contract = !code.is_empty();

        let head = self.chain.latest_block_number().await?;
        let window = window_bounds(head, self.config.activity_window);

        let mut first_tx = None;
        let mut last_tx = None;
        let mut creation_tx = None;

        if let Some(window) = window {
            let mut blocks = self.scan(window);
            while let Some(fetched) = blocks.next().await {
                let Some((block, transactions)) = fetched? else {
                    continue;
                };
                for tx in transactions.iter().filter(|tx| tx.from == address) {
                    let seen = ActivityTx::new(tx, &block);
                    if last_tx.is_none() {
                        last_tx = Some(seen.clone());
                    }
                    if is_contract && tx.to.is_none() {
                        creation_tx = Some(seen.clone());
                    }
                    first_tx = Some(seen);
                }
            }
        }

        debug!(
            "Resolved {:?}: contract={}, nonce={}, window={:?}, last_tx={:?}",
            address,
            is_contract,
            tx_count,
            window,
            last_tx.as_ref().map(|tx| tx.block_number)
        );

        if let Some(cache) = &self.cache {
            let record = AddressRecord {
                address,
                balance: balance.to_string(),
                tx_count,
                is_contract,
                bytecode: is_contract.then(|| code.clone()),
                updated_at: unix_now(),
            };
            if let Err(e) = cache.upsert_address(record).await {
                warn!("Failed to cache address {:?}: {}", address, e);
            }
        }

        Ok(AddressActivity {
            address,
            balance: balance.to_string(),
            is_contract,
            tx_count,
            first_tx,
            last_tx,
            creation_tx,
            window,
        })
    }

    /// Transactions sent or received by `address` within the recent window,
    /// newest first. Totals are exact for the window only.
    pub async fn recent_transactions(
        &self,
        address: Address,
        request: PageRequest,
    ) -> Result<Page<Transaction>, ResolveError> {
        let head = self.chain.latest_block_number().await?;
        let mut matching = Vec::new();

        if let Some(window) = window_bounds(head, self.config.recent_tx_window) {
            let mut blocks = self.scan(window);
            while let Some(fetched) = blocks.next().await {
                let Some((block, transactions)) = fetched? else {
                    continue;
                };
                matching.extend(
                    transactions
                        .iter()
                        .enumerate()
                        .filter(|(_, tx)| tx.from == address || tx.to == Some(address))
                        .map(|(position, tx)| Transaction::from_chain(tx, &block, position)),
                );
            }
        }

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.page_size() as usize)
            .collect();

        Ok(Page {
            items,
            pagination: Pagination::exact(request, total),
            source: DataSource::RecentWindow,
        })
    }

    /// Full blocks of `window`, newest first, fetched with bounded concurrency.
    fn scan(
        &self,
        window: ScanWindow,
    ) -> impl Stream<Item = Result<Option<(ChainBlock, Vec<ChainTransaction>)>, SourceError>>
    + Send
    + 'static {
        let chain = Arc::clone(&self.chain);
        stream::iter((window.from_block..=window.to_block).rev())
            .map(move |number| {
                let chain = Arc::clone(&chain);
                async move {
                    fetch_full_block(chain.as_ref(), number)
                        .await
                        .map_err(unresolved_as_malformed)
                }
            })
            .buffered(self.config.fetch_concurrency.max(1))
    }
}

/// The `window` most recent blocks ending at `head`, clamped at genesis.
pub fn window_bounds(head: u64, window: u64) -> Option<ScanWindow> {
    (window > 0).then(|| ScanWindow {
        from_block: head.saturating_sub(window - 1),
        to_block: head,
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_covers_exactly_w_blocks() {
        let window = window_bounds(1_000, 100).unwrap();
        assert_eq!(window.from_block, 901);
        assert_eq!(window.to_block, 1_000);
        assert_eq!(window.to_block - window.from_block + 1, 100);
    }

    #[test]
    fn window_clamps_at_genesis() {
        let window = window_bounds(10, 100).unwrap();
        assert_eq!(window.from_block, 0);
        assert!(window_bounds(10, 0).is_none());
    }
}
