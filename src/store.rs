//! Async face of the ledger store.
//!
//! SQLite calls block, so [`SqliteStore`] runs every repository call on the
//! blocking pool. The [`LedgerStore`] trait is what the sync engine and query
//! service depend on.

use crate::error::StoreError;
use crate::repository::{
    AddressRecord, AddressRepository, Block, BlockRepository, Database, StoreStats, TokenTransfer,
    TokenTransferRepository, Transaction, TransactionRepository,
};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{error, info};

/// Rows written by one [`LedgerStore::persist_block`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub blocks_written: usize,
    pub transactions_written: usize,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Highest stored block number; this is the sync checkpoint.
    async fn max_block_number(&self) -> Result<Option<u64>, StoreError>;

    async fn block_hash(&self, number: u64) -> Result<Option<B256>, StoreError>;

    /// Writes a block and its transactions as one unit. Re-persisting an
    /// already stored block writes nothing and succeeds.
    async fn persist_block(
        &self,
        block: Block,
        transactions: Vec<Transaction>,
    ) -> Result<PersistOutcome, StoreError>;

    async fn count_blocks(&self) -> Result<u64, StoreError>;

    async fn blocks_page(&self, limit: u64, offset: u64) -> Result<Vec<Block>, StoreError>;

    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, StoreError>;

    async fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, StoreError>;

    async fn count_transactions(&self) -> Result<u64, StoreError>;

    async fn transactions_page(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Transaction>, StoreError>;

    async fn transactions_in_block(&self, number: u64) -> Result<Vec<Transaction>, StoreError>;

    async fn upsert_address(&self, record: AddressRecord) -> Result<(), StoreError>;

    async fn address(&self, address: Address) -> Result<Option<AddressRecord>, StoreError>;

    async fn token_transfers_for_transaction(
        &self,
        hash: B256,
    ) -> Result<Vec<TokenTransfer>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&*conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn max_block_number(&self) -> Result<Option<u64>, StoreError> {
        self.with_conn(|conn| BlockRepository::new(conn).get_latest_block_number())
            .await
    }

    async fn block_hash(&self, number: u64) -> Result<Option<B256>, StoreError> {
        self.with_conn(move |conn| BlockRepository::new(conn).get_hash(number))
            .await
    }

    async fn persist_block(
        &self,
        block: Block,
        transactions: Vec<Transaction>,
    ) -> Result<PersistOutcome, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let blocks_written = BlockRepository::new(&tx).insert(&block)?;
            let transactions_written = TransactionRepository::new(&tx).upsert_all(&transactions)?;
            tx.commit()?;
            Ok(PersistOutcome {
                blocks_written,
                transactions_written,
            })
        })
        .await
    }

    async fn count_blocks(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| BlockRepository::new(conn).count()).await
    }

    async fn blocks_page(&self, limit: u64, offset: u64) -> Result<Vec<Block>, StoreError> {
        self.with_conn(move |conn| BlockRepository::new(conn).get_page(limit, offset))
            .await
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<Block>, StoreError> {
        self.with_conn(move |conn| BlockRepository::new(conn).get_by_number(number))
            .await
    }

    async fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, StoreError> {
        self.with_conn(move |conn| BlockRepository::new(conn).get_by_hash(&hash))
            .await
    }

    async fn count_transactions(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| TransactionRepository::new(conn).count())
            .await
    }

    async fn transactions_page(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.with_conn(move |conn| TransactionRepository::new(conn).get_page(limit, offset))
            .await
    }

    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<Transaction>, StoreError> {
        self.with_conn(move |conn| TransactionRepository::new(conn).get_by_hash(&hash))
            .await
    }

    async fn transactions_in_block(&self, number: u64) -> Result<Vec<Transaction>, StoreError> {
        self.with_conn(move |conn| TransactionRepository::new(conn).get_for_block(number))
            .await
    }

    async fn upsert_address(&self, record: AddressRecord) -> Result<(), StoreError> {
        self.with_conn(move |conn| AddressRepository::new(conn).upsert(&record))
            .await
    }

    async fn address(&self, address: Address) -> Result<Option<AddressRecord>, StoreError> {
        self.with_conn(move |conn| AddressRepository::new(conn).get(&address))
            .await
    }

    async fn token_transfers_for_transaction(
        &self,
        hash: B256,
    ) -> Result<Vec<TokenTransfer>, StoreError> {
        self.with_conn(move |conn| TokenTransferRepository::new(conn).get_for_transaction(&hash))
            .await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.with_conn(|conn| TransactionRepository::new(conn).get_statistics())
            .await
    }
}

/// Opens the SQLite ledger at `database_url`. A database that cannot be opened
/// is logged and replaced by an [`UnavailableStore`], so reads still fall back
/// to the chain and the scheduler keeps retrying against nothing rather than
/// the process exiting.
pub fn open_store(database_url: &str) -> Arc<dyn LedgerStore> {
    match Database::new(database_url) {
        Ok(db) => {
            info!("Database initialized at {}", database_url);
            Arc::new(SqliteStore::new(db))
        }
        Err(e) => {
            error!(
                "Database at {} unavailable, serving reads from the chain: {:#}",
                database_url, e
            );
            Arc::new(UnavailableStore::new(format!("{e:#}")))
        }
    }
}

/// Stand-in for a database that could not be opened. Every call fails with
/// [`StoreError::Unavailable`], which sends reads down the chain fallback.
#[derive(Debug, Clone)]
pub struct UnavailableStore {
    reason: String,
}

impl UnavailableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> StoreError {
        StoreError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl LedgerStore for UnavailableStore {
    async fn max_block_number(&self) -> Result<Option<u64>, StoreError> {
        Err(self.error())
    }

    async fn block_hash(&self, _number: u64) -> Result<Option<B256>, StoreError> {
        Err(self.error())
    }

    async fn persist_block(
        &self,
        _block: Block,
        _transactions: Vec<Transaction>,
    ) -> Result<PersistOutcome, StoreError> {
        Err(self.error())
    }

    async fn count_blocks(&self) -> Result<u64, StoreError> {
        Err(self.error())
    }

    async fn blocks_page(&self, _limit: u64, _offset: u64) -> Result<Vec<Block>, StoreError> {
        Err(self.error())
    }

    async fn block_by_number(&self, _number: u64) -> Result<Option<Block>, StoreError> {
        Err(self.error())
    }

    async fn block_by_hash(&self, _hash: B256) -> Result<Option<Block>, StoreError> {
        Err(self.error())
    }

    async fn count_transactions(&self) -> Result<u64, StoreError> {
        Err(self.error())
    }

    async fn transactions_page(
        &self,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<Transaction>, StoreError> {
        Err(self.error())
    }

    async fn transaction_by_hash(&self, _hash: B256) -> Result<Option<Transaction>, StoreError> {
        Err(self.error())
    }

    async fn transactions_in_block(&self, _number: u64) -> Result<Vec<Transaction>, StoreError> {
        Err(self.error())
    }

    async fn upsert_address(&self, _record: AddressRecord) -> Result<(), StoreError> {
        Err(self.error())
    }

    async fn address(&self, _address: Address) -> Result<Option<AddressRecord>, StoreError> {
        Err(self.error())
    }

    async fn token_transfers_for_transaction(
        &self,
        _hash: B256,
    ) -> Result<Vec<TokenTransfer>, StoreError> {
        Err(self.error())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Err(self.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_store_reports_its_reason() {
        let store = UnavailableStore::new("unable to open database file");
        let err = store.count_transactions().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(
            err.to_string(),
            "store unavailable: unable to open database file"
        );
        assert!(store.max_block_number().await.is_err());
    }

    #[tokio::test]
    async fn unopenable_database_degrades_to_unavailable_store() {
        let store = open_store("sqlite:/nonexistent-chain-mirror-dir/nested/mirror.db");
        let err = store.count_blocks().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.to_string().contains("Failed to open database"));
    }

    #[tokio::test]
    async fn openable_database_is_served_by_sqlite() {
        let store = open_store("sqlite::memory:");
        assert_eq!(store.count_blocks().await.unwrap(), 0);
        assert_eq!(store.max_block_number().await.unwrap(), None);
    }
}
