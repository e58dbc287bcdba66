use anyhow::{Context, Result};
use chain_mirror::repository::Database;
use chain_mirror::store::{LedgerStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    dotenv::dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./mirror.db".to_string());

    println!("Running migrations on database: {database_url}");

    let db = Database::new(&database_url).context("Failed to open database")?;
    let stats = SqliteStore::new(db).stats().await?;

    println!("Migrations completed successfully!");
    println!(
        "Store holds {} blocks and {} transactions (latest block: {})",
        stats.total_blocks,
        stats.total_transactions,
        stats
            .latest_block
            .map_or("none".to_string(), |b| b.to_string())
    );

    Ok(())
}
