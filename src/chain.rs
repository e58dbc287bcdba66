//! The contract the core consumes from the remote ledger.
//!
//! Everything that talks to the chain goes through [`ChainSource`], so the sync
//! engine, query fallback and resolvers can be driven by the alloy-backed
//! [`crate::rpc::RpcClient`] in production and by an in-memory chain in tests.

use crate::error::SourceError;
use alloy_primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How a block is addressed on the chain source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLookup {
    Number(u64),
    Hash(B256),
}

impl fmt::Display for BlockLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockLookup::Number(number) => write!(f, "#{number}"),
            BlockLookup::Hash(hash) => write!(f, "{hash:?}"),
        }
    }
}

/// Decimal digits are a height, anything else must be a 32-byte hex hash.
impl FromStr for BlockLookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(BlockLookup::Number)
                .map_err(|_| format!("Block number out of range: {s}"));
        }
        B256::from_str(s)
            .map(BlockLookup::Hash)
            .map_err(|_| format!("Invalid block number or hash: {s}"))
    }
}

/// A block as returned by the chain source.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainBlock {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub miner: Address,
    pub difficulty: U256,
    pub total_difficulty: Option<U256>,
    pub size: Option<u64>,
    pub nonce: Option<String>,
    pub extra_data: Bytes,
    pub base_fee_per_gas: Option<u64>,
    pub transactions: Vec<TransactionRef>,
}

/// Block bodies come back either as full objects or as bare hashes, depending
/// on the request and the node. Callers that need details resolve `Hash`
/// entries explicitly through [`ChainSource::transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionRef {
    Hash(B256),
    Full(ChainTransaction),
}

impl TransactionRef {
    pub fn hash(&self) -> B256 {
        match self {
            TransactionRef::Hash(hash) => *hash,
            TransactionRef::Full(tx) => tx.hash,
        }
    }

    pub fn as_full(&self) -> Option<&ChainTransaction> {
        match self {
            TransactionRef::Full(tx) => Some(tx),
            TransactionRef::Hash(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainTransaction {
    pub hash: B256,
    pub block_number: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: Option<u128>,
    pub gas: u64,
    pub nonce: u64,
    pub transaction_index: Option<u64>,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub status: bool,
    pub gas_used: u64,
    #[serde(serialize_with = "crate::repository::models::u128_as_string")]
    pub effective_gas_price: u128,
    pub contract_address: Option<Address>,
}

#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, SourceError>;

    /// Returns `None` when the node has no block for `lookup`.
    async fn block(
        &self,
        lookup: BlockLookup,
        include_transactions: bool,
    ) -> Result<Option<ChainBlock>, SourceError>;

    async fn transaction(&self, hash: B256) -> Result<Option<ChainTransaction>, SourceError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>, SourceError>;

    async fn balance(&self, address: Address) -> Result<U256, SourceError>;

    async fn code(&self, address: Address) -> Result<Bytes, SourceError>;

    async fn transaction_count(&self, address: Address) -> Result<u64, SourceError>;
}

/// Why [`fetch_full_block`] could not produce a complete block.
#[derive(Debug)]
pub enum FullBlockError {
    Source(SourceError),
    /// The block lists a transaction hash the source could not return.
    Unresolved(B256),
}

impl From<SourceError> for FullBlockError {
    fn from(error: SourceError) -> Self {
        FullBlockError::Source(error)
    }
}

/// Fetches a block with its transactions and resolves any hash-only entries
/// into full transactions. `Ok(None)` means the source has no such block.
pub async fn fetch_full_block(
    chain: &dyn ChainSource,
    number: u64,
) -> Result<Option<(ChainBlock, Vec<ChainTransaction>)>, FullBlockError> {
    let Some(block) = chain.block(BlockLookup::Number(number), true).await? else {
        return Ok(None);
    };
    let transactions = resolve_transactions(chain, &block).await?;
    Ok(Some((block, transactions)))
}

/// Full transactions of `block`, in body order.
pub async fn resolve_transactions(
    chain: &dyn ChainSource,
    block: &ChainBlock,
) -> Result<Vec<ChainTransaction>, FullBlockError> {
    let mut transactions = Vec::with_capacity(block.transactions.len());
    for entry in &block.transactions {
        match entry {
            TransactionRef::Full(tx) => transactions.push(tx.clone()),
            TransactionRef::Hash(hash) => match chain.transaction(*hash).await? {
                Some(tx) => transactions.push(tx),
                None => return Err(FullBlockError::Unresolved(*hash)),
            },
        }
    }
    Ok(transactions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_block_lookup() {
        assert_eq!("42".parse::<BlockLookup>(), Ok(BlockLookup::Number(42)));
        let hash = format!("0x{}", "0f".repeat(32));
        assert_eq!(
            hash.parse::<BlockLookup>(),
            Ok(BlockLookup::Hash(B256::from_str(&hash).unwrap()))
        );
        assert!("latest".parse::<BlockLookup>().is_err());
        assert!("0x12".parse::<BlockLookup>().is_err());
    }
}
