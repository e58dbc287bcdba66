#![allow(dead_code)]

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use async_trait::async_trait;
use chain_mirror::chain::{
    BlockLookup, ChainBlock, ChainReceipt, ChainSource, ChainTransaction, TransactionRef,
};
use chain_mirror::error::SourceError;
use chain_mirror::repository::Database;
use chain_mirror::store::{SqliteStore, UnavailableStore};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 12;

pub fn block_hash(number: u64) -> B256 {
    keccak256([b"block".as_slice(), &number.to_be_bytes()].concat())
}

pub fn tx_hash(number: u64, index: usize) -> B256 {
    keccak256([b"tx".as_slice(), &number.to_be_bytes(), &(index as u64).to_be_bytes()].concat())
}

pub fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

#[derive(Debug, Clone, Default)]
struct Account {
    balance: U256,
    code: Bytes,
    nonce: u64,
}

/// In-memory chain with consistent parent links. Block `n` has hash
/// `block_hash(n)` and its transactions `tx_hash(n, i)`.
#[derive(Default)]
pub struct MockChain {
    blocks: Mutex<Vec<ChainBlock>>,
    hidden: Mutex<HashSet<u64>>,
    failed_txs: Mutex<HashSet<B256>>,
    accounts: Mutex<HashMap<Address, Account>>,
    failing: AtomicBool,
    hash_only: AtomicBool,
    delay: Mutex<Duration>,
    block_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain whose block `n` carries `tx_counts[n]` transfers from `addr(0xaa)`
    /// to `addr(0xbb)`.
    pub fn with_tx_counts(tx_counts: &[usize]) -> Self {
        let chain = Self::new();
        for count in tx_counts {
            chain.push_block(vec![(addr(0xaa), Some(addr(0xbb))); *count]);
        }
        chain
    }

    pub fn with_empty_blocks(count: u64) -> Self {
        let chain = Self::new();
        chain.push_empty_blocks(count);
        chain
    }

    /// Appends a block holding one transaction per `(from, to)` pair and
    /// returns its number.
    pub fn push_block(&self, transactions: Vec<(Address, Option<Address>)>) -> u64 {
        let mut blocks = self.blocks.lock().unwrap();
        let number = blocks.len() as u64;
        let parent_hash = number
            .checked_sub(1)
            .map_or(B256::ZERO, block_hash);
        let transactions = transactions
            .into_iter()
            .enumerate()
            .map(|(index, (from, to))| {
                TransactionRef::Full(ChainTransaction {
                    hash: tx_hash(number, index),
                    block_number: Some(number),
                    from,
                    to,
                    value: U256::from(1_000_000_000_000_000u64 * (index as u64 + 1)),
                    gas_price: Some(20_000_000_000),
                    gas: 21_000,
                    nonce: index as u64,
                    transaction_index: Some(index as u64),
                    input: Bytes::new(),
                })
            })
            .collect();

        blocks.push(ChainBlock {
            number,
            hash: block_hash(number),
            parent_hash,
            timestamp: GENESIS_TIMESTAMP + number * BLOCK_TIME,
            gas_used: 21_000,
            gas_limit: 30_000_000,
            miner: addr(0x01),
            difficulty: U256::ZERO,
            total_difficulty: None,
            size: Some(600),
            nonce: None,
            extra_data: Bytes::new(),
            base_fee_per_gas: Some(7),
            transactions,
        });
        number
    }

    pub fn push_empty_blocks(&self, count: u64) {
        for _ in 0..count {
            self.push_block(Vec::new());
        }
    }

    pub fn head(&self) -> u64 {
        self.blocks.lock().unwrap().len() as u64 - 1
    }

    /// Makes `block(number)` answer "no such block".
    pub fn hide_block(&self, number: u64) {
        self.hidden.lock().unwrap().insert(number);
    }

    pub fn reveal_block(&self, number: u64) {
        self.hidden.lock().unwrap().remove(&number);
    }

    pub fn set_parent_hash(&self, number: u64, parent_hash: B256) {
        self.blocks.lock().unwrap()[number as usize].parent_hash = parent_hash;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Bodies list bare hashes that must be resolved one by one.
    pub fn set_hash_only(&self, hash_only: bool) {
        self.hash_only.store(hash_only, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_transaction(&self, hash: B256) {
        self.failed_txs.lock().unwrap().insert(hash);
    }

    pub fn set_account(&self, address: Address, balance: U256, code: Bytes, nonce: u64) {
        self.accounts
            .lock()
            .unwrap()
            .insert(address, Account { balance, code, nonce });
    }

    pub fn block_calls(&self) -> usize {
        self.block_calls.load(Ordering::SeqCst)
    }

    pub fn reset_block_calls(&self) {
        self.block_calls.store(0, Ordering::SeqCst);
    }

    /// Most `block` calls ever observed in flight at once. Only meaningful
    /// with a non-zero delay.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn check(&self, method: &'static str) -> Result<(), SourceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Rpc {
                method,
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn find_transaction(&self, hash: B256) -> Option<ChainTransaction> {
        self.blocks
            .lock()
            .unwrap()
            .iter()
            .flat_map(|block| block.transactions.iter())
            .filter_map(TransactionRef::as_full)
            .find(|tx| tx.hash == hash)
            .cloned()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn latest_block_number(&self) -> Result<u64, SourceError> {
        self.check("eth_blockNumber")?;
        Ok(self.head())
    }

    async fn block(
        &self,
        lookup: BlockLookup,
        include_transactions: bool,
    ) -> Result<Option<ChainBlock>, SourceError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.check("eth_getBlockByNumber")?;

        let block = {
            let blocks = self.blocks.lock().unwrap();
            match lookup {
                BlockLookup::Number(number) => blocks.get(number as usize).cloned(),
                BlockLookup::Hash(hash) => blocks.iter().find(|b| b.hash == hash).cloned(),
            }
        };
        let Some(mut block) = block else {
            return Ok(None);
        };
        if self.hidden.lock().unwrap().contains(&block.number) {
            return Ok(None);
        }

        if !include_transactions || self.hash_only.load(Ordering::SeqCst) {
            block.transactions = block
                .transactions
                .iter()
                .map(|entry| TransactionRef::Hash(entry.hash()))
                .collect();
        }
        Ok(Some(block))
    }

    async fn transaction(&self, hash: B256) -> Result<Option<ChainTransaction>, SourceError> {
        self.check("eth_getTransactionByHash")?;
        Ok(self.find_transaction(hash))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>, SourceError> {
        self.check("eth_getTransactionReceipt")?;
        Ok(self.find_transaction(hash).map(|tx| ChainReceipt {
            transaction_hash: tx.hash,
            block_number: tx.block_number,
            status: !self.failed_txs.lock().unwrap().contains(&hash),
            gas_used: 21_000,
            effective_gas_price: 20_000_000_000,
            contract_address: None,
        }))
    }

    async fn balance(&self, address: Address) -> Result<U256, SourceError> {
        self.check("eth_getBalance")?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&address)
            .map(|a| a.balance)
            .unwrap_or_default())
    }

    async fn code(&self, address: Address) -> Result<Bytes, SourceError> {
        self.check("eth_getCode")?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&address)
            .map(|a| a.code.clone())
            .unwrap_or_default())
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, SourceError> {
        self.check("eth_getTransactionCount")?;
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(&address)
            .map(|a| a.nonce)
            .unwrap_or_default())
    }
}

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new(Database::in_memory().unwrap()))
}

/// A store whose every call fails, as when the database is unreachable.
pub fn failing_store() -> Arc<UnavailableStore> {
    Arc::new(UnavailableStore::new("database is down"))
}
