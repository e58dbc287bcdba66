use super::models::{StoreStats, Transaction};
use super::{parse_column, parse_optional_column};
use crate::error::StoreError;
use alloy_primitives::B256;
use rusqlite::{OptionalExtension, Row, params};

pub struct TransactionRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TransactionRepository<'a> {
    // Rows are immutable except for a status that was unknown at insert time.
    const UPSERT_TRANSACTION: &'static str = "INSERT INTO transactions (
            hash, block_number, from_address, to_address, value, gas_price, gas,
            nonce, transaction_index, input, status, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(hash) DO UPDATE SET status = excluded.status
        WHERE transactions.status IS NULL AND excluded.status IS NOT NULL";

    const SELECT_TRANSACTION: &'static str = "SELECT hash, block_number, from_address,
        to_address, value, gas_price, gas, nonce, transaction_index, input, status, timestamp
        FROM transactions";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Upserts every row with one prepared statement. The caller owns the
    /// surrounding SQL transaction so a block and its rows commit together.
    pub fn upsert_all(&self, transactions: &[Transaction]) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare_cached(Self::UPSERT_TRANSACTION)?;
        let mut count = 0;

        for tx in transactions {
            count += stmt.execute(params![
                format!("{:?}", tx.hash),
                tx.block_number,
                format!("{:?}", tx.from),
                tx.to.map(|to| format!("{to:?}")),
                tx.value,
                tx.gas_price,
                tx.gas,
                tx.nonce,
                tx.transaction_index,
                tx.input.to_string(),
                tx.status,
                tx.timestamp,
            ])?;
        }

        Ok(count)
    }

    pub fn get_by_hash(&self, hash: &B256) -> Result<Option<Transaction>, StoreError> {
        let query = format!("{} WHERE hash = ?1", Self::SELECT_TRANSACTION);
        let tx = self
            .conn
            .query_row(&query, params![format!("{hash:?}")], Self::row_to_transaction)
            .optional()?;
        Ok(tx)
    }

    pub fn get_for_block(&self, block_number: u64) -> Result<Vec<Transaction>, StoreError> {
        let query = format!(
            "{} WHERE block_number = ?1 ORDER BY transaction_index ASC",
            Self::SELECT_TRANSACTION
        );
        let mut stmt = self.conn.prepare(&query)?;
        let transactions = stmt
            .query_map(params![block_number], Self::row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Newest block first, block order preserved within a block.
    pub fn get_page(&self, limit: u64, offset: u64) -> Result<Vec<Transaction>, StoreError> {
        let query = format!(
            "{} ORDER BY block_number DESC, transaction_index ASC LIMIT ?1 OFFSET ?2",
            Self::SELECT_TRANSACTION
        );
        let mut stmt = self.conn.prepare(&query)?;
        let transactions = stmt
            .query_map(params![limit, offset], Self::row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    pub fn get_statistics(&self) -> Result<StoreStats, StoreError> {
        let (total_blocks, earliest_block, latest_block): (u64, Option<u64>, Option<u64>) =
            self.conn.query_row(
                "SELECT COUNT(*), MIN(number), MAX(number) FROM blocks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let total_transactions = self.count()?;

        let total_token_transfers: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM token_transfers", [], |row| row.get(0))?;

        let cached_addresses: u64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM addresses", [], |row| row.get(0))?;

        Ok(StoreStats {
            total_blocks,
            total_transactions,
            total_token_transfers,
            cached_addresses,
            earliest_block,
            latest_block,
        })
    }

    fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
        Ok(Transaction {
            hash: parse_column(row, 0)?,
            block_number: row.get(1)?,
            from: parse_column(row, 2)?,
            to: parse_optional_column(row, 3)?,
            value: row.get(4)?,
            gas_price: row.get(5)?,
            gas: row.get(6)?,
            nonce: row.get(7)?,
            transaction_index: row.get(8)?,
            input: parse_column(row, 9)?,
            status: row.get(10)?,
            timestamp: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Block, BlockRepository, Database};
    use alloy_primitives::{Address, Bytes};

    fn block(number: u64) -> Block {
        Block {
            number,
            hash: B256::with_last_byte(number as u8 + 100),
            parent_hash: B256::ZERO,
            timestamp: 1_000 + number,
            gas_used: 0,
            gas_limit: 0,
            miner: Address::ZERO,
            difficulty: None,
            total_difficulty: None,
            size: None,
            nonce: None,
            extra_data: Bytes::new(),
            base_fee_per_gas: None,
            transaction_count: 2,
        }
    }

    fn tx(block_number: u64, index: u64) -> Transaction {
        Transaction {
            hash: B256::with_last_byte((block_number * 10 + index) as u8),
            block_number,
            from: Address::with_last_byte(1),
            to: (index % 2 == 0).then(|| Address::with_last_byte(2)),
            value: "1000000000000000000".to_string(),
            gas_price: Some("1000000000".to_string()),
            gas: 21_000,
            nonce: index,
            transaction_index: index,
            input: Bytes::new(),
            status: None,
            timestamp: 1_000 + block_number,
        }
    }

    fn seeded() -> Database {
        let db = Database::in_memory().unwrap();
        {
            let conn = db.conn.lock().unwrap();
            for number in 1..=3 {
                BlockRepository::new(&conn).insert(&block(number)).unwrap();
                TransactionRepository::new(&conn)
                    .upsert_all(&[tx(number, 0), tx(number, 1)])
                    .unwrap();
            }
        }
        db
    }

    #[test]
    fn pages_by_block_descending() {
        let db = seeded();
        let conn = db.conn.lock().unwrap();
        let repo = TransactionRepository::new(&conn);

        let page: Vec<(u64, u64)> = repo
            .get_page(3, 1)
            .unwrap()
            .iter()
            .map(|t| (t.block_number, t.transaction_index))
            .collect();
        assert_eq!(page, vec![(3, 1), (2, 0), (2, 1)]);
        assert_eq!(repo.count().unwrap(), 6);
    }

    #[test]
    fn backfills_missing_status_only() {
        let db = seeded();
        let conn = db.conn.lock().unwrap();
        let repo = TransactionRepository::new(&conn);

        let mut receipt_seen = tx(2, 0);
        receipt_seen.status = Some(false);
        assert_eq!(repo.upsert_all(&[receipt_seen.clone()]).unwrap(), 1);

        let mut contradicting = receipt_seen.clone();
        contradicting.status = Some(true);
        assert_eq!(repo.upsert_all(&[contradicting]).unwrap(), 0);
        assert_eq!(repo.upsert_all(&[tx(2, 0)]).unwrap(), 0);

        let stored = repo.get_by_hash(&receipt_seen.hash).unwrap().unwrap();
        assert_eq!(stored, receipt_seen);
    }

    #[test]
    fn round_trips_contract_creation_rows() {
        let db = seeded();
        let conn = db.conn.lock().unwrap();
        let repo = TransactionRepository::new(&conn);

        let rows = repo.get_for_block(1).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].to, None);
        assert_eq!(rows[1], tx(1, 1));

        let stats = repo.get_statistics().unwrap();
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.total_transactions, 6);
        assert_eq!(stats.earliest_block, Some(1));
        assert_eq!(stats.latest_block, Some(3));
    }
}
