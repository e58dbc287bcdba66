use crate::chain::BlockLookup;
use crate::explorer::Explorer;
use crate::query::formatters::{
    OutputFormat, format_activity, format_block_detail, format_blocks, format_search,
    format_stats, format_sync_report, format_transaction_detail, format_transactions,
};
use crate::query::{PageRequest, QueryService};
use crate::resolver::AddressResolver;
use crate::store::LedgerStore;
use crate::sync::SyncEngine;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::str::FromStr;

pub async fn cmd_blocks(
    service: &QueryService,
    page: u64,
    page_size: u64,
    format: &OutputFormat,
) -> Result<()> {
    let request = PageRequest::new(page, page_size)?;
    let blocks = service.list_blocks(request).await?;
    println!("{}", format_blocks(&blocks, format));
    Ok(())
}

pub async fn cmd_transactions(
    service: &QueryService,
    page: u64,
    page_size: u64,
    format: &OutputFormat,
) -> Result<()> {
    let request = PageRequest::new(page, page_size)?;
    let transactions = service.list_transactions(request).await?;
    println!("{}", format_transactions(&transactions, format));
    Ok(())
}

pub async fn cmd_block(explorer: &Explorer, id: &str, format: &OutputFormat) -> Result<()> {
    let lookup = BlockLookup::from_str(id).map_err(|e| anyhow::anyhow!(e))?;
    match explorer.block_detail(lookup).await? {
        Some(detail) => println!("{}", format_block_detail(&detail, format)),
        None => println!("Block {lookup} not found."),
    }
    Ok(())
}

pub async fn cmd_transaction(explorer: &Explorer, hash: &str, format: &OutputFormat) -> Result<()> {
    let hash = B256::from_str(hash)
        .map_err(|_| anyhow::anyhow!("Invalid transaction hash: {}", hash))?;
    match explorer.transaction_detail(hash).await? {
        Some(detail) => println!("{}", format_transaction_detail(&detail, format)),
        None => println!("Transaction {hash:?} not found."),
    }
    Ok(())
}

pub async fn cmd_address(
    resolver: &AddressResolver,
    address: &str,
    format: &OutputFormat,
) -> Result<()> {
    let address = Address::from_str(address)
        .map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))?;
    let activity = resolver.resolve(address).await?;
    println!("{}", format_activity(&activity, format));
    Ok(())
}

pub async fn cmd_address_transactions(
    resolver: &AddressResolver,
    address: &str,
    page: u64,
    page_size: u64,
    format: &OutputFormat,
) -> Result<()> {
    let address = Address::from_str(address)
        .map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))?;
    let request = PageRequest::new(page, page_size)?;
    let transactions = resolver.recent_transactions(address, request).await?;
    println!("{}", format_transactions(&transactions, format));
    Ok(())
}

pub async fn cmd_search(explorer: &Explorer, query: &str, format: &OutputFormat) -> Result<()> {
    let result = explorer.search(query).await?;
    println!("{}", format_search(&result, format));
    Ok(())
}

pub async fn cmd_stats(store: &dyn LedgerStore, format: &OutputFormat) -> Result<()> {
    let stats = store.stats().await?;
    println!("{}", format_stats(&stats, format));
    Ok(())
}

pub async fn cmd_sync(engine: &SyncEngine, format: &OutputFormat) -> Result<()> {
    let report = engine.run_sync().await?;
    println!("{}", format_sync_report(&report, format));
    match report.shortfall() {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}
