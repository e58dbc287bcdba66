use super::models::TokenTransfer;
use super::parse_column;
use crate::error::StoreError;
use alloy_primitives::B256;
use rusqlite::{Row, params};

/// Read side of `token_transfers`. Nothing in the sync path writes the table.
pub struct TokenTransferRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> TokenTransferRepository<'a> {
    const SELECT_BY_TRANSACTION: &'static str = "SELECT transaction_hash, log_index,
        block_number, from_address, to_address, token_address, value, timestamp
        FROM token_transfers WHERE transaction_hash = ?1 ORDER BY log_index ASC";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn get_for_transaction(&self, hash: &B256) -> Result<Vec<TokenTransfer>, StoreError> {
        let mut stmt = self.conn.prepare(Self::SELECT_BY_TRANSACTION)?;
        let transfers = stmt
            .query_map(params![format!("{hash:?}")], Self::row_to_transfer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(transfers)
    }

    fn row_to_transfer(row: &Row) -> rusqlite::Result<TokenTransfer> {
        Ok(TokenTransfer {
            transaction_hash: parse_column(row, 0)?,
            log_index: row.get(1)?,
            block_number: row.get(2)?,
            from: parse_column(row, 3)?,
            to: parse_column(row, 4)?,
            token_address: parse_column(row, 5)?,
            value: row.get(6)?,
            timestamp: row.get(7)?,
        })
    }
}
