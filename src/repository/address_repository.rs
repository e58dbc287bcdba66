use super::models::AddressRecord;
use super::{parse_column, parse_optional_column};
use crate::error::StoreError;
use alloy_primitives::Address;
use rusqlite::{OptionalExtension, params};

pub struct AddressRepository<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> AddressRepository<'a> {
    const UPSERT_ADDRESS: &'static str =
        "INSERT INTO addresses (address, balance, tx_count, is_contract, bytecode, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(address) DO UPDATE SET
            balance = excluded.balance,
            tx_count = excluded.tx_count,
            is_contract = excluded.is_contract,
            bytecode = excluded.bytecode,
            updated_at = excluded.updated_at";

    const GET_ADDRESS: &'static str = "SELECT address, balance, tx_count, is_contract, bytecode,
        updated_at FROM addresses WHERE address = ?1";

    pub fn new(conn: &'a rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn upsert(&self, record: &AddressRecord) -> Result<(), StoreError> {
        self.conn.execute(
            Self::UPSERT_ADDRESS,
            params![
                format!("{:?}", record.address),
                record.balance,
                record.tx_count,
                record.is_contract,
                record.bytecode.as_ref().map(|code| code.to_string()),
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, address: &Address) -> Result<Option<AddressRecord>, StoreError> {
        let record = self
            .conn
            .query_row(Self::GET_ADDRESS, params![format!("{address:?}")], |row| {
                Ok(AddressRecord {
                    address: parse_column(row, 0)?,
                    balance: row.get(1)?,
                    tx_count: row.get(2)?,
                    is_contract: row.get(3)?,
                    bytecode: parse_optional_column(row, 4)?,
                    updated_at: row.get(5)?,
                })
            })
            .optional()?;
        Ok(record)
    }
}
