use super::models::Block;
use super::parse_column;
use crate::error::StoreError;
use alloy_primitives::B256;
use rusqlite::{OptionalExtension, Row, params};

pub struct BlockRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> BlockRepository<'a> {
    // Either unique key (number, hash) already present means the block is stored.
    const INSERT_BLOCK: &'static str = "INSERT INTO blocks (
            number, hash, parent_hash, timestamp, gas_used, gas_limit, miner,
            difficulty, total_difficulty, size, nonce, extra_data, base_fee_per_gas,
            transaction_count
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT DO NOTHING";

    const SELECT_BLOCK: &'static str = "SELECT number, hash, parent_hash, timestamp, gas_used,
        gas_limit, miner, difficulty, total_difficulty, size, nonce, extra_data,
        base_fee_per_gas, transaction_count FROM blocks";

    const GET_LATEST_BLOCK_NUMBER: &'static str = "SELECT MAX(number) FROM blocks";

    const GET_HASH_BY_NUMBER: &'static str = "SELECT hash FROM blocks WHERE number = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Returns the number of rows written: 0 when the block was already stored.
    pub fn insert(&self, block: &Block) -> Result<usize, StoreError> {
        let written = self.conn.execute(
            Self::INSERT_BLOCK,
            params![
                block.number,
                format!("{:?}", block.hash),
                format!("{:?}", block.parent_hash),
                block.timestamp,
                block.gas_used,
                block.gas_limit,
                format!("{:?}", block.miner),
                block.difficulty,
                block.total_difficulty,
                block.size,
                block.nonce,
                block.extra_data.to_string(),
                block.base_fee_per_gas,
                block.transaction_count,
            ],
        )?;
        Ok(written)
    }

    pub fn get_latest_block_number(&self) -> Result<Option<u64>, StoreError> {
        let number: Option<u64> =
            self.conn
                .query_row(Self::GET_LATEST_BLOCK_NUMBER, [], |row| row.get(0))?;
        Ok(number)
    }

    pub fn get_hash(&self, number: u64) -> Result<Option<B256>, StoreError> {
        let hash = self
            .conn
            .query_row(Self::GET_HASH_BY_NUMBER, params![number], |row| {
                parse_column::<B256>(row, 0)
            })
            .optional()?;
        Ok(hash)
    }

    pub fn get_by_number(&self, number: u64) -> Result<Option<Block>, StoreError> {
        let query = format!("{} WHERE number = ?1", Self::SELECT_BLOCK);
        let block = self
            .conn
            .query_row(&query, params![number], Self::row_to_block)
            .optional()?;
        Ok(block)
    }

    pub fn get_by_hash(&self, hash: &B256) -> Result<Option<Block>, StoreError> {
        let query = format!("{} WHERE hash = ?1", Self::SELECT_BLOCK);
        let block = self
            .conn
            .query_row(&query, params![format!("{hash:?}")], Self::row_to_block)
            .optional()?;
        Ok(block)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Newest first.
    pub fn get_page(&self, limit: u64, offset: u64) -> Result<Vec<Block>, StoreError> {
        let query = format!(
            "{} ORDER BY number DESC LIMIT ?1 OFFSET ?2",
            Self::SELECT_BLOCK
        );
        let mut stmt = self.conn.prepare(&query)?;
        let blocks = stmt
            .query_map(params![limit, offset], Self::row_to_block)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(blocks)
    }

    fn row_to_block(row: &Row) -> rusqlite::Result<Block> {
        Ok(Block {
            number: row.get(0)?,
            hash: parse_column(row, 1)?,
            parent_hash: parse_column(row, 2)?,
            timestamp: row.get(3)?,
            gas_used: row.get(4)?,
            gas_limit: row.get(5)?,
            miner: parse_column(row, 6)?,
            difficulty: row.get(7)?,
            total_difficulty: row.get(8)?,
            size: row.get(9)?,
            nonce: row.get(10)?,
            extra_data: parse_column(row, 11)?,
            base_fee_per_gas: row.get(12)?,
            transaction_count: row.get(13)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Database;
    use alloy_primitives::{Address, Bytes};

    fn block(number: u64) -> Block {
        Block {
            number,
            hash: B256::with_last_byte(number as u8 + 1),
            parent_hash: B256::with_last_byte(number as u8),
            timestamp: 1_700_000_000 + number,
            gas_used: 21_000,
            gas_limit: 30_000_000,
            miner: Address::with_last_byte(0xaa),
            difficulty: Some("340282366920938463463374607431768211455".to_string()),
            total_difficulty: None,
            size: Some(512),
            nonce: Some("0x0000000000000000".to_string()),
            extra_data: Bytes::from_static(&[0xde, 0xad]),
            base_fee_per_gas: Some(7),
            transaction_count: 0,
        }
    }

    #[test]
    fn insert_is_idempotent_on_number_and_hash() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        let repo = BlockRepository::new(&conn);

        assert_eq!(repo.insert(&block(1)).unwrap(), 1);
        assert_eq!(repo.insert(&block(1)).unwrap(), 0);

        let mut same_hash = block(2);
        same_hash.hash = block(1).hash;
        assert_eq!(repo.insert(&same_hash).unwrap(), 0);

        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(repo.get_by_number(1).unwrap(), Some(block(1)));
    }

    #[test]
    fn pages_newest_first_and_reports_max() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn.lock().unwrap();
        let repo = BlockRepository::new(&conn);
        assert_eq!(repo.get_latest_block_number().unwrap(), None);

        for number in 0..5 {
            repo.insert(&block(number)).unwrap();
        }

        let numbers: Vec<u64> = repo
            .get_page(2, 1)
            .unwrap()
            .iter()
            .map(|b| b.number)
            .collect();
        assert_eq!(numbers, vec![3, 2]);
        assert_eq!(repo.get_latest_block_number().unwrap(), Some(4));
        assert_eq!(repo.get_hash(3).unwrap(), Some(block(3).hash));
        assert_eq!(
            repo.get_by_hash(&block(2).hash).unwrap().map(|b| b.number),
            Some(2)
        );
    }
}
