use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Shared handle to the SQLite ledger. Cloning shares the connection.
#[derive(Clone)]
pub struct Database {
    pub conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let db_path = db_path.strip_prefix("sqlite:").unwrap_or(db_path);
        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .context("Failed to enable WAL journal")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        create_tables(&conn).context("Failed to create tables")?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS blocks (
            number INTEGER PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            parent_hash TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            gas_used INTEGER NOT NULL,
            gas_limit INTEGER NOT NULL,
            miner TEXT NOT NULL,
            difficulty TEXT,
            total_difficulty TEXT,
            size INTEGER,
            nonce TEXT,
            extra_data TEXT NOT NULL,
            base_fee_per_gas INTEGER,
            transaction_count INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            hash TEXT PRIMARY KEY,
            block_number INTEGER NOT NULL REFERENCES blocks(number),
            from_address TEXT NOT NULL,
            to_address TEXT,
            value TEXT NOT NULL,
            gas_price TEXT,
            gas INTEGER NOT NULL,
            nonce INTEGER NOT NULL,
            transaction_index INTEGER NOT NULL,
            input TEXT NOT NULL,
            status INTEGER,
            timestamp INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_block_number
            ON transactions(block_number DESC, transaction_index);

        CREATE INDEX IF NOT EXISTS idx_transactions_from
            ON transactions(from_address);

        CREATE INDEX IF NOT EXISTS idx_transactions_to
            ON transactions(to_address);

        CREATE TABLE IF NOT EXISTS addresses (
            address TEXT PRIMARY KEY,
            balance TEXT NOT NULL,
            tx_count INTEGER NOT NULL,
            is_contract INTEGER NOT NULL,
            bytecode TEXT,
            updated_at INTEGER NOT NULL
        );

        -- Populated from logs in a later pipeline; sync never writes here.
        CREATE TABLE IF NOT EXISTS token_transfers (
            transaction_hash TEXT NOT NULL REFERENCES transactions(hash),
            log_index INTEGER NOT NULL,
            block_number INTEGER NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT NOT NULL,
            token_address TEXT NOT NULL,
            value TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            PRIMARY KEY (transaction_hash, log_index)
        );

        CREATE INDEX IF NOT EXISTS idx_token_transfers_token
            ON token_transfers(token_address);",
    )
}
