use crate::explorer::{BlockDetail, SearchResult, TransactionDetail};
use crate::query::{DataSource, Page, Pagination};
use crate::repository::{Block, StoreStats, Transaction};
use crate::resolver::{ActivityTx, AddressActivity};
use crate::sync::SyncReport;
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde::Serialize;
use serde_json::json;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_blocks(page: &Page<Block>, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if page.items.is_empty() {
                return "No blocks found.".to_string();
            }
            let mut table = new_table(vec!["Number", "Hash", "Time", "Txs", "Gas Used", "Miner"]);
            for block in &page.items {
                table.add_row(vec![
                    Cell::new(block.number),
                    Cell::new(format_hash(&format!("{:?}", block.hash))),
                    Cell::new(block.timestamp),
                    Cell::new(block.transaction_count),
                    Cell::new(block.gas_used),
                    Cell::new(format!("{:#}", block.miner)),
                ]);
            }
            format!("{table}\n{}", page_footer(&page.pagination, page.source, "blocks"))
        }
        OutputFormat::Json => to_json(&json!({
            "blocks": page.items,
            "pagination": page.pagination,
            "source": page.source,
        })),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "number",
                "hash",
                "parent_hash",
                "timestamp",
                "transaction_count",
                "gas_used",
                "gas_limit",
                "miner",
            ]);
            for block in &page.items {
                let _ = wtr.write_record([
                    &block.number.to_string(),
                    &format!("{:?}", block.hash),
                    &format!("{:?}", block.parent_hash),
                    &block.timestamp.to_string(),
                    &block.transaction_count.to_string(),
                    &block.gas_used.to_string(),
                    &block.gas_limit.to_string(),
                    &format!("{:?}", block.miner),
                ]);
            }
            into_string(wtr)
        }
    }
}

pub fn format_transactions(page: &Page<Transaction>, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if page.items.is_empty() {
                return "No transactions found.".to_string();
            }
            let mut table = new_table(vec!["Block", "Tx Hash", "From", "To", "Value (ETH)", "Status"]);
            for tx in &page.items {
                table.add_row(vec![
                    Cell::new(tx.block_number),
                    Cell::new(format_hash(&format!("{:?}", tx.hash))),
                    Cell::new(format!("{:#}", tx.from)),
                    Cell::new(
                        tx.to
                            .map_or("Contract Creation".to_string(), |to| format!("{to:#}")),
                    ),
                    Cell::new(format_ether(&tx.value)),
                    Cell::new(format_status(tx.status)),
                ]);
            }
            format!(
                "{table}\n{}",
                page_footer(&page.pagination, page.source, "transactions")
            )
        }
        OutputFormat::Json => to_json(&json!({
            "transactions": page.items,
            "pagination": page.pagination,
            "source": page.source,
        })),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "block_number",
                "transaction_index",
                "hash",
                "from",
                "to",
                "value_wei",
                "gas_price",
                "status",
            ]);
            for tx in &page.items {
                let _ = wtr.write_record([
                    &tx.block_number.to_string(),
                    &tx.transaction_index.to_string(),
                    &format!("{:?}", tx.hash),
                    &format!("{:?}", tx.from),
                    &tx.to.map(|to| format!("{to:?}")).unwrap_or_default(),
                    &tx.value,
                    &tx.gas_price.clone().unwrap_or_default(),
                    &tx.status.map(|status| status.to_string()).unwrap_or_default(),
                ]);
            }
            into_string(wtr)
        }
    }
}

pub fn format_block_detail(detail: &BlockDetail, format: &OutputFormat) -> String {
    let block = &detail.block;
    match format {
        OutputFormat::Json => to_json(detail),
        _ => format_fields(
            vec![
                ("number", block.number.to_string()),
                ("hash", format!("{:?}", block.hash)),
                ("parent_hash", format!("{:?}", block.parent_hash)),
                ("timestamp", block.timestamp.to_string()),
                ("miner", format!("{:?}", block.miner)),
                ("gas_used", block.gas_used.to_string()),
                ("gas_limit", block.gas_limit.to_string()),
                ("base_fee_per_gas", or_na(block.base_fee_per_gas)),
                ("transactions", block.transaction_count.to_string()),
                ("source", source_name(detail.source).to_string()),
            ],
            format,
        ),
    }
}

pub fn format_transaction_detail(detail: &TransactionDetail, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(detail),
        _ => format_fields(
            vec![
                ("hash", format!("{:?}", detail.hash)),
                ("block_number", or_na(detail.block_number)),
                ("timestamp", or_na(detail.timestamp)),
                ("from", format!("{:?}", detail.from)),
                (
                    "to",
                    detail
                        .to
                        .map_or("Contract Creation".to_string(), |to| format!("{to:?}")),
                ),
                ("value", format_ether(&detail.value)),
                ("status", format_status(detail.status)),
                ("gas", detail.gas.to_string()),
                ("gas_used", or_na(detail.gas_used)),
                ("gas_price", or_na(detail.gas_price.as_ref())),
                ("nonce", detail.nonce.to_string()),
                ("contract_address", or_na(detail.contract_address.map(|a| format!("{a:?}")))),
                ("token_transfers", detail.token_transfers.len().to_string()),
            ],
            format,
        ),
    }
}

pub fn format_activity(activity: &AddressActivity, format: &OutputFormat) -> String {
    let activity_tx = |tx: &Option<ActivityTx>| {
        tx.as_ref()
            .map_or("N/A".to_string(), |tx| format!("{:?} (block {})", tx.hash, tx.block_number))
    };
    match format {
        OutputFormat::Json => to_json(activity),
        _ => format_fields(
            vec![
                ("address", format!("{:?}", activity.address)),
                ("balance", format_ether(&activity.balance)),
                ("balance_wei", activity.balance.clone()),
                ("is_contract", activity.is_contract.to_string()),
                ("tx_count", activity.tx_count.to_string()),
                ("first_tx", activity_tx(&activity.first_tx)),
                ("last_tx", activity_tx(&activity.last_tx)),
                ("creation_tx", activity_tx(&activity.creation_tx)),
                (
                    "scanned_blocks",
                    activity.window.map_or("none".to_string(), |w| {
                        format!("{}-{}", w.from_block, w.to_block)
                    }),
                ),
            ],
            format,
        ),
    }
}

pub fn format_search(result: &SearchResult, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(result),
        _ => {
            let rows = match result {
                SearchResult::Block { number, hash } => vec![
                    ("type", "block".to_string()),
                    ("number", number.to_string()),
                    ("hash", format!("{hash:?}")),
                ],
                SearchResult::Transaction { hash } => vec![
                    ("type", "transaction".to_string()),
                    ("hash", format!("{hash:?}")),
                ],
                SearchResult::Address {
                    address,
                    is_contract,
                } => vec![
                    ("type", "address".to_string()),
                    ("address", format!("{address:?}")),
                    ("is_contract", is_contract.to_string()),
                ],
                SearchResult::NotFound { query } => vec![
                    ("type", "not_found".to_string()),
                    ("query", query.clone()),
                ],
            };
            format_fields(rows, format)
        }
    }
}

pub fn format_stats(stats: &StoreStats, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(stats),
        _ => format_fields(
            vec![
                ("total_blocks", stats.total_blocks.to_string()),
                ("total_transactions", stats.total_transactions.to_string()),
                ("total_token_transfers", stats.total_token_transfers.to_string()),
                ("cached_addresses", stats.cached_addresses.to_string()),
                ("earliest_block", or_na(stats.earliest_block)),
                ("latest_block", or_na(stats.latest_block)),
            ],
            format,
        ),
    }
}

pub fn format_sync_report(report: &SyncReport, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(report),
        _ => format_fields(
            vec![
                ("status", format!("{:?}", report.status)),
                ("from_block", or_na(report.from_block)),
                ("to_block", or_na(report.to_block)),
                ("blocks_written", report.blocks_written.to_string()),
                ("transactions_written", report.transactions_written.to_string()),
                ("checkpoint", or_na(report.checkpoint)),
                ("stopped_before", or_na(report.stopped_before)),
                ("elapsed_ms", report.elapsed_ms.to_string()),
            ],
            format,
        ),
    }
}

/// Two-column metric/value rendering shared by the single-item views.
fn format_fields(rows: Vec<(&str, String)>, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            for (metric, value) in &rows {
                let _ = wtr.write_record([*metric, value.as_str()]);
            }
            into_string(wtr)
        }
        _ => {
            let mut table = new_table(vec!["Metric", "Value"]);
            for (metric, value) in rows {
                table.add_row(vec![Cell::new(metric), Cell::new(value)]);
            }
            table.to_string()
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn page_footer(pagination: &Pagination, source: DataSource, noun: &str) -> String {
    let total = if pagination.estimated {
        format!("~{} {noun} (estimated)", pagination.total_items)
    } else {
        format!("{} {noun}", pagination.total_items)
    };
    format!(
        "Page {} of {}, {total}, source: {}",
        pagination.current_page,
        pagination.total_pages,
        source_name(source)
    )
}

fn source_name(source: DataSource) -> &'static str {
    match source {
        DataSource::Store => "store",
        DataSource::Chain => "chain",
        DataSource::RecentWindow => "recent blocks",
    }
}

fn format_status(status: Option<bool>) -> String {
    match status {
        Some(true) => "Success".to_string(),
        Some(false) => "Failed".to_string(),
        None => "Unknown".to_string(),
    }
}

/// Renders a decimal wei amount in ether, falling back to the raw string.
fn format_ether(wei: &str) -> String {
    U256::from_str(wei)
        .ok()
        .and_then(|value| format_units(value, 18u8).ok())
        .unwrap_or_else(|| wei.to_string())
}

fn format_hash(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or("N/A".to_string(), |v| v.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn into_string(wtr: Writer<Vec<u8>>) -> String {
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::PageRequest;

    #[test]
    fn formats_wei_as_ether() {
        assert_eq!(format_ether("1500000000000000000"), "1.500000000000000000");
        assert_eq!(format_ether("not-a-number"), "not-a-number");
    }

    #[test]
    fn footer_marks_estimated_totals() {
        let request = PageRequest::new(2, 10).unwrap();
        let footer = page_footer(&Pagination::estimated(request, 95), DataSource::Chain, "transactions");
        assert_eq!(
            footer,
            "Page 2 of 10, ~95 transactions (estimated), source: chain"
        );
    }

    #[test]
    fn csv_fields_have_header() {
        let csv = format_fields(vec![("total_blocks", "3".to_string())], &OutputFormat::Csv);
        assert_eq!(csv, "metric,value\ntotal_blocks,3\n");
    }
}
