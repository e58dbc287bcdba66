pub mod address_repository;
pub mod block_repository;
pub mod database;
pub mod models;
pub mod token_transfer_repository;
pub mod transaction_repository;

pub use address_repository::AddressRepository;
pub use block_repository::BlockRepository;
pub use database::Database;
pub use models::{AddressRecord, Block, StoreStats, TokenTransfer, Transaction};
pub use token_transfer_repository::TokenTransferRepository;
pub use transaction_repository::TransactionRepository;

use rusqlite::Row;
use rusqlite::types::Type;
use std::str::FromStr;

/// Reads a TEXT column and parses it, reporting parse failures as conversion
/// errors on that column.
fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.get::<_, String>(idx)?
        .parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_column<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.get::<_, Option<String>>(idx)?
        .map(|value| {
            value.parse::<T>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}
