use crate::chain::{ChainBlock, ChainTransaction};
use alloy_primitives::{Address, B256, Bytes};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub miner: Address,
    /// Decimal string; difficulties overflow every native numeric type we could use.
    pub difficulty: Option<String>,
    pub total_difficulty: Option<String>,
    pub size: Option<u64>,
    pub nonce: Option<String>,
    pub extra_data: Bytes,
    pub base_fee_per_gas: Option<u64>,
    pub transaction_count: u64,
}

impl Block {
    pub fn from_chain(block: &ChainBlock) -> Self {
        Block {
            number: block.number,
            hash: block.hash,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp,
            gas_used: block.gas_used,
            gas_limit: block.gas_limit,
            miner: block.miner,
            difficulty: Some(block.difficulty.to_string()),
            total_difficulty: block.total_difficulty.map(|td| td.to_string()),
            size: block.size,
            nonce: block.nonce.clone(),
            extra_data: block.extra_data.clone(),
            base_fee_per_gas: block.base_fee_per_gas,
            transaction_count: block.transactions.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub block_number: u64,
    pub from: Address,
    /// `None` marks a contract creation.
    pub to: Option<Address>,
    pub value: String,
    pub gas_price: Option<String>,
    pub gas: u64,
    pub nonce: u64,
    pub transaction_index: u64,
    pub input: Bytes,
    pub status: Option<bool>,
    pub timestamp: u64,
}

impl Transaction {
    /// Builds the stored row for `tx` as carried by `block`. The position in
    /// the block body stands in for a missing `transactionIndex`.
    pub fn from_chain(tx: &ChainTransaction, block: &ChainBlock, position: usize) -> Self {
        Transaction {
            hash: tx.hash,
            block_number: tx.block_number.unwrap_or(block.number),
            from: tx.from,
            to: tx.to,
            value: tx.value.to_string(),
            gas_price: tx.gas_price.map(|price| price.to_string()),
            gas: tx.gas,
            nonce: tx.nonce,
            transaction_index: tx.transaction_index.unwrap_or(position as u64),
            input: tx.input.clone(),
            status: None,
            timestamp: block.timestamp,
        }
    }
}

/// Cached account facts. Never authoritative; the resolver recomputes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    pub address: Address,
    pub balance: String,
    pub tx_count: u64,
    pub is_contract: bool,
    pub bytecode: Option<Bytes>,
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub transaction_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub token_address: Address,
    pub value: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_blocks: u64,
    pub total_transactions: u64,
    pub total_token_transfers: u64,
    pub cached_addresses: u64,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
}

/// Wei amounts and gas prices go over the wire as decimal strings.
pub fn u128_as_string<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}
