use anyhow::Result;
use chain_mirror::chain::ChainSource;
use chain_mirror::config::Config;
use chain_mirror::explorer::Explorer;
use chain_mirror::query::QueryService;
use chain_mirror::query::commands::{
    cmd_address, cmd_address_transactions, cmd_block, cmd_blocks, cmd_search, cmd_stats,
    cmd_sync, cmd_transaction, cmd_transactions,
};
use chain_mirror::query::formatters::OutputFormat;
use chain_mirror::repository::Database;
use chain_mirror::resolver::AddressResolver;
use chain_mirror::rpc::RpcClient;
use chain_mirror::store::{LedgerStore, SqliteStore};
use chain_mirror::sync::SyncEngine;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query the mirrored chain data", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Blocks {
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "10")]
        page_size: u64,
    },
    Transactions {
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "10")]
        page_size: u64,
    },
    /// Block detail by number or hash.
    Block {
        id: String,
    },
    Tx {
        hash: String,
    },
    Address {
        address: String,
    },
    /// Transactions of an address within the most recent blocks.
    AddressTransactions {
        address: String,
        #[arg(long, default_value = "1")]
        page: u64,
        #[arg(long, default_value = "10")]
        page_size: u64,
    },
    Search {
        query: String,
    },
    Stats,
    /// Runs one sync pass and prints its report.
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let db = Database::new(&config.database_url)?;
    let store: Arc<dyn LedgerStore> = Arc::new(SqliteStore::new(db));

    match cli.command {
        Commands::Blocks { page, page_size } => {
            let chain = connect(&config)?;
            let service = QueryService::new(store, chain, config.fallback_config());
            cmd_blocks(&service, page, page_size, &format).await?;
        }
        Commands::Transactions { page, page_size } => {
            let chain = connect(&config)?;
            let service = QueryService::new(store, chain, config.fallback_config());
            cmd_transactions(&service, page, page_size, &format).await?;
        }
        Commands::Block { id } => {
            let chain = connect(&config)?;
            let explorer = Explorer::new(chain, store, config.explorer_config());
            cmd_block(&explorer, &id, &format).await?;
        }
        Commands::Tx { hash } => {
            let chain = connect(&config)?;
            let explorer = Explorer::new(chain, store, config.explorer_config());
            cmd_transaction(&explorer, &hash, &format).await?;
        }
        Commands::Address { address } => {
            let chain = connect(&config)?;
            let resolver =
                AddressResolver::new(chain, config.resolver_config()).with_cache(store);
            cmd_address(&resolver, &address, &format).await?;
        }
        Commands::AddressTransactions {
            address,
            page,
            page_size,
        } => {
            let chain = connect(&config)?;
            let resolver = AddressResolver::new(chain, config.resolver_config());
            cmd_address_transactions(&resolver, &address, page, page_size, &format).await?;
        }
        Commands::Search { query } => {
            let chain = connect(&config)?;
            let explorer = Explorer::new(chain, store, config.explorer_config());
            cmd_search(&explorer, &query, &format).await?;
        }
        Commands::Sync => {
            let chain = connect(&config)?;
            let engine = SyncEngine::new(chain, store, config.sync_config());
            cmd_sync(&engine, &format).await?;
        }
        Commands::Stats => {
            cmd_stats(store.as_ref(), &format).await?;
        }
    }

    Ok(())
}

fn connect(config: &Config) -> Result<Arc<dyn ChainSource>> {
    let client = RpcClient::new(&config.json_rpc_urls)?
        .with_max_retries(config.rpc_max_retries)
        .with_request_timeout(config.rpc_timeout);
    Ok(Arc::new(client))
}
