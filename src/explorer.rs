//! Single-item lookups for the explorer surface: block and transaction detail,
//! search, and a short network overview. The store is consulted first where it
//! holds the data; the chain source fills in whatever the mirror has not
//! reached yet.

use crate::chain::{
    BlockLookup, ChainBlock, ChainReceipt, ChainSource, ChainTransaction, resolve_transactions,
};
use crate::error::{SourceError, StoreError};
use crate::query::DataSource;
use crate::query::service::unresolved_as_malformed;
use crate::repository::{Block, StoreStats, TokenTransfer, Transaction};
use crate::store::LedgerStore;
use alloy_primitives::{Address, B256, Bytes};
use futures::stream::{self, StreamExt, TryStreamExt};
use regex::Regex;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Blocks sampled for the network overview.
    pub overview_blocks: u64,
    pub fetch_concurrency: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            overview_blocks: 10,
            fetch_concurrency: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDetail {
    pub block: Block,
    pub transactions: Vec<Transaction>,
    pub source: DataSource,
}

/// A transaction merged with its receipt. Receipt fields are `None` while the
/// transaction is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    pub hash: B256,
    pub block_number: Option<u64>,
    pub timestamp: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: String,
    pub gas_price: Option<String>,
    pub gas: u64,
    pub nonce: u64,
    pub transaction_index: Option<u64>,
    pub input: Bytes,
    pub status: Option<bool>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<String>,
    pub contract_address: Option<Address>,
    pub token_transfers: Vec<TokenTransfer>,
    pub source: DataSource,
}

impl TransactionDetail {
    fn from_stored(tx: Transaction) -> Self {
        Self {
            hash: tx.hash,
            block_number: Some(tx.block_number),
            timestamp: Some(tx.timestamp),
            from: tx.from,
            to: tx.to,
            value: tx.value,
            gas_price: tx.gas_price,
            gas: tx.gas,
            nonce: tx.nonce,
            transaction_index: Some(tx.transaction_index),
            input: tx.input,
            status: tx.status,
            gas_used: None,
            effective_gas_price: None,
            contract_address: None,
            token_transfers: Vec::new(),
            source: DataSource::Store,
        }
    }

    fn from_chain(tx: ChainTransaction, timestamp: Option<u64>) -> Self {
        Self {
            hash: tx.hash,
            block_number: tx.block_number,
            timestamp,
            from: tx.from,
            to: tx.to,
            value: tx.value.to_string(),
            gas_price: tx.gas_price.map(|price| price.to_string()),
            gas: tx.gas,
            nonce: tx.nonce,
            transaction_index: tx.transaction_index,
            input: tx.input,
            status: None,
            gas_used: None,
            effective_gas_price: None,
            contract_address: None,
            token_transfers: Vec::new(),
            source: DataSource::Chain,
        }
    }

    fn apply_receipt(&mut self, receipt: &ChainReceipt) {
        self.status = Some(receipt.status);
        self.gas_used = Some(receipt.gas_used);
        self.effective_gas_price = Some(receipt.effective_gas_price.to_string());
        self.contract_address = receipt.contract_address;
        if self.block_number.is_none() {
            self.block_number = receipt.block_number;
        }
    }
}

/// What a free-form search string looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTarget {
    BlockNumber(u64),
    /// 32 bytes: a transaction hash or a block hash.
    Hash(B256),
    Address(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SearchResult {
    Block { number: u64, hash: B256 },
    Transaction { hash: B256 },
    #[serde(rename_all = "camelCase")]
    Address { address: Address, is_contract: bool },
    NotFound { query: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkOverview {
    pub latest_block: u64,
    /// Seconds between blocks across the sample.
    pub average_block_time: Option<f64>,
    pub sampled_transactions: u64,
    /// Mean legacy gas price of sampled transactions, wei.
    pub average_gas_price: Option<String>,
    pub recent_blocks: Vec<Block>,
    /// `None` when the store could not be read.
    pub store: Option<StoreStats>,
}

pub struct Explorer {
    chain: Arc<dyn ChainSource>,
    store: Arc<dyn LedgerStore>,
    config: ExplorerConfig,
}

impl Explorer {
    pub fn new(
        chain: Arc<dyn ChainSource>,
        store: Arc<dyn LedgerStore>,
        config: ExplorerConfig,
    ) -> Self {
        Self {
            chain,
            store,
            config,
        }
    }

    pub async fn block_detail(&self, lookup: BlockLookup) -> Result<Option<BlockDetail>, SourceError> {
        match self.block_from_store(lookup).await {
            Ok(Some(detail)) => return Ok(Some(detail)),
            Ok(None) => {}
            Err(e) => warn!("Store lookup of block {} failed: {}", lookup, e),
        }

        let Some(block) = self.chain.block(lookup, true).await? else {
            return Ok(None);
        };
        let transactions = resolve_transactions(self.chain.as_ref(), &block)
            .await
            .map_err(unresolved_as_malformed)?
            .iter()
            .enumerate()
            .map(|(position, tx)| Transaction::from_chain(tx, &block, position))
            .collect();

        Ok(Some(BlockDetail {
            block: Block::from_chain(&block),
            transactions,
            source: DataSource::Chain,
        }))
    }

    async fn block_from_store(&self, lookup: BlockLookup) -> Result<Option<BlockDetail>, StoreError> {
        let block = match lookup {
            BlockLookup::Number(number) => self.store.block_by_number(number).await?,
            BlockLookup::Hash(hash) => self.store.block_by_hash(hash).await?,
        };
        let Some(block) = block else {
            return Ok(None);
        };
        let transactions = self.store.transactions_in_block(block.number).await?;
        Ok(Some(BlockDetail {
            block,
            transactions,
            source: DataSource::Store,
        }))
    }

    pub async fn transaction_detail(&self, hash: B256) -> Result<Option<TransactionDetail>, SourceError> {
        let stored = self.store.transaction_by_hash(hash).await.unwrap_or_else(|e| {
            warn!("Store lookup of transaction {:?} failed: {}", hash, e);
            None
        });

        let mut detail = match stored {
            Some(tx) => TransactionDetail::from_stored(tx),
            None => {
                let Some(tx) = self.chain.transaction(hash).await? else {
                    return Ok(None);
                };
                let timestamp = match tx.block_number {
                    Some(number) => self
                        .chain
                        .block(BlockLookup::Number(number), false)
                        .await?
                        .map(|block| block.timestamp),
                    None => None,
                };
                TransactionDetail::from_chain(tx, timestamp)
            }
        };

        if let Some(receipt) = self.chain.transaction_receipt(hash).await? {
            detail.apply_receipt(&receipt);
        }

        detail.token_transfers = self
            .store
            .token_transfers_for_transaction(hash)
            .await
            .unwrap_or_else(|e| {
                warn!("Could not load token transfers for {:?}: {}", hash, e);
                Vec::new()
            });

        Ok(Some(detail))
    }

    pub async fn search(&self, query: &str) -> Result<SearchResult, SourceError> {
        let not_found = || SearchResult::NotFound {
            query: query.trim().to_string(),
        };

        let result = match classify(query) {
            Some(SearchTarget::BlockNumber(number)) => self
                .find_block(BlockLookup::Number(number))
                .await?
                .map(|(number, hash)| SearchResult::Block { number, hash }),
            Some(SearchTarget::Hash(hash)) => {
                if self.transaction_exists(hash).await? {
                    Some(SearchResult::Transaction { hash })
                } else {
                    self.find_block(BlockLookup::Hash(hash))
                        .await?
                        .map(|(number, hash)| SearchResult::Block { number, hash })
                }
            }
            Some(SearchTarget::Address(address)) => {
                let code = self.chain.code(address).await?;
                Some(SearchResult::Address {
                    address,
                    is_contract: !code.is_empty(),
                })
            }
            None => None,
        };

        Ok(result.unwrap_or_else(not_found))
    }

    async fn find_block(&self, lookup: BlockLookup) -> Result<Option<(u64, B256)>, SourceError> {
        let stored = match lookup {
            BlockLookup::Number(number) => self.store.block_by_number(number).await,
            BlockLookup::Hash(hash) => self.store.block_by_hash(hash).await,
        };
        match stored {
            Ok(Some(block)) => return Ok(Some((block.number, block.hash))),
            Ok(None) => {}
            Err(e) => warn!("Store lookup of block {} failed: {}", lookup, e),
        }
        Ok(self
            .chain
            .block(lookup, false)
            .await?
            .map(|block| (block.number, block.hash)))
    }

    async fn transaction_exists(&self, hash: B256) -> Result<bool, SourceError> {
        match self.store.transaction_by_hash(hash).await {
            Ok(Some(_)) => return Ok(true),
            Ok(None) => {}
            Err(e) => warn!("Store lookup of transaction {:?} failed: {}", hash, e),
        }
        Ok(self.chain.transaction(hash).await?.is_some())
    }

    pub async fn overview(&self) -> Result<NetworkOverview, SourceError> {
        let head = self.chain.latest_block_number().await?;
        let bottom = head.saturating_sub(self.config.overview_blocks.max(1) - 1);

        let chain = Arc::clone(&self.chain);
        let blocks: Vec<ChainBlock> = stream::iter((bottom..=head).rev())
            .map(move |number| {
                let chain = Arc::clone(&chain);
                async move { chain.block(BlockLookup::Number(number), true).await }
            })
            .buffered(self.config.fetch_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?
            .into_iter()
            .flatten()
            .collect();

        let gas_prices: Vec<u128> = blocks
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter_map(|entry| entry.as_full()?.gas_price)
            .collect();
        let average_gas_price = (!gas_prices.is_empty()).then(|| {
            let sum = gas_prices.iter().fold(0u128, |acc, price| acc.saturating_add(*price));
            (sum / gas_prices.len() as u128).to_string()
        });

        let store = match self.store.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Store statistics unavailable: {}", e);
                None
            }
        };

        Ok(NetworkOverview {
            latest_block: head,
            average_block_time: average_block_time(&blocks),
            sampled_transactions: blocks
                .iter()
                .map(|block| block.transactions.len() as u64)
                .sum(),
            average_gas_price,
            recent_blocks: blocks.iter().map(Block::from_chain).collect(),
            store,
        })
    }
}

/// Classifies a search string: decimal digits are a block number, 32 hex bytes
/// a hash, 20 hex bytes an address.
pub fn classify(query: &str) -> Option<SearchTarget> {
    let query = query.trim();

    let number = Regex::new(r"^\d+$").ok()?;
    if number.is_match(query) {
        return query.parse().ok().map(SearchTarget::BlockNumber);
    }

    let hash = Regex::new(r"^0x[a-fA-F0-9]{64}$").ok()?;
    if hash.is_match(query) {
        return B256::from_str(query).ok().map(SearchTarget::Hash);
    }

    let address = Regex::new(r"^0x[a-fA-F0-9]{40}$").ok()?;
    if address.is_match(query) {
        return Address::from_str(query).ok().map(SearchTarget::Address);
    }

    None
}

/// Mean spacing of `blocks` (newest first), in seconds.
fn average_block_time(blocks: &[ChainBlock]) -> Option<f64> {
    let (newest, oldest) = (blocks.first()?, blocks.last()?);
    let heights = newest.number.checked_sub(oldest.number).filter(|span| *span > 0)?;
    let seconds = newest.timestamp.saturating_sub(oldest.timestamp);
    Some(seconds as f64 / heights as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn block(number: u64, timestamp: u64) -> ChainBlock {
        ChainBlock {
            number,
            hash: B256::with_last_byte(number as u8),
            parent_hash: B256::ZERO,
            timestamp,
            gas_used: 0,
            gas_limit: 30_000_000,
            miner: Address::ZERO,
            difficulty: U256::ZERO,
            total_difficulty: None,
            size: None,
            nonce: None,
            extra_data: Bytes::new(),
            base_fee_per_gas: None,
            transactions: Vec::new(),
        }
    }

    #[test]
    fn classifies_search_queries() {
        assert_eq!(classify("12345"), Some(SearchTarget::BlockNumber(12345)));
        assert_eq!(classify(" 7 "), Some(SearchTarget::BlockNumber(7)));

        let hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(
            classify(&hash),
            Some(SearchTarget::Hash(B256::from_str(&hash).unwrap()))
        );

        let address = "0x00000000000000000000000000000000000000Aa";
        assert_eq!(
            classify(address),
            Some(SearchTarget::Address(Address::from_str(address).unwrap()))
        );
    }

    #[test]
    fn rejects_unrecognised_queries() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("vitalik.eth"), None);
        assert_eq!(classify("0x1234"), None);
        assert_eq!(classify("99999999999999999999999"), None);
    }

    #[test]
    fn averages_block_spacing() {
        let blocks = vec![block(110, 1_120), block(105, 1_060), block(100, 1_000)];
        assert_eq!(average_block_time(&blocks), Some(12.0));
        assert_eq!(average_block_time(&blocks[..1]), None);
        assert_eq!(average_block_time(&[]), None);
    }
}
