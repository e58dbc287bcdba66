use alloy_primitives::B256;
use std::time::Duration;
use thiserror::Error;

/// A chain source call failed. Always treated as transient: the sync engine
/// retries on its next tick, request paths surface it to the caller.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("rpc call `{method}` failed: {message}")]
    Rpc { method: &'static str, message: String },
    #[error("rpc call `{method}` timed out after {}s", .timeout.as_secs())]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },
    #[error("rpc call `{method}` returned malformed data: {message}")]
    Malformed { method: &'static str, message: String },
}

/// The ledger store could not serve a request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(String),
    #[error("store connection lock poisoned")]
    Poisoned,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not read checkpoint: {0}")]
    Checkpoint(#[source] StoreError),
    #[error("could not read chain head: {0}")]
    Head(#[source] SourceError),
    #[error("chain source failed while fetching block {block}: {error}")]
    Source { block: u64, error: SourceError },
    #[error("failed to persist block {block}: {error}")]
    Store { block: u64, error: StoreError },
    #[error("block {block} lists transaction {hash} which the chain source could not return")]
    UnresolvedTransaction { block: u64, hash: B256 },
    #[error("block {block} parent {parent} does not match stored hash {stored} of block {}", .block.saturating_sub(1))]
    ParentMismatch {
        block: u64,
        parent: B256,
        stored: B256,
    },
}

/// A page request outside `page >= 1`, `page_size >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("page must be at least 1")]
    ZeroPage,
    #[error("pageSize must be at least 1")]
    ZeroPageSize,
    #[error("page {page} of size {page_size} is out of range")]
    OutOfRange { page: u64, page_size: u64 },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid page request: {0}")]
    InvalidPage(#[from] PageError),
    #[error("ledger store failed ({store}) and chain fallback failed ({chain})")]
    FallbackFailed {
        store: StoreError,
        chain: SourceError,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("chain source failed: {0}")]
    Source(#[from] SourceError),
    #[error("invalid page request: {0}")]
    InvalidPage(#[from] PageError),
}
