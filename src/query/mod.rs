pub mod commands;
pub mod formatters;
pub mod service;

pub use service::{FallbackConfig, QueryService};

use crate::error::PageError;
use serde::Serialize;

/// Largest `page * page_size` product accepted; keeps offsets inside SQLite's
/// signed 64-bit range.
const MAX_PAGE_END: u64 = i64::MAX as u64;

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    page_size: u64,
}

impl PageRequest {
    pub fn new(page: u64, page_size: u64) -> Result<Self, PageError> {
        if page == 0 {
            return Err(PageError::ZeroPage);
        }
        if page_size == 0 {
            return Err(PageError::ZeroPageSize);
        }
        match page.checked_mul(page_size) {
            Some(end) if end <= MAX_PAGE_END => Ok(Self { page, page_size }),
            _ => Err(PageError::OutOfRange { page, page_size }),
        }
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Number of items before this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }

    /// Number of items up to and including this page.
    pub fn end(&self) -> u64 {
        self.page * self.page_size
    }
}

/// Where a page of results was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataSource {
    Store,
    Chain,
    /// A scan of the most recent blocks only; older activity is not included.
    RecentWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u64,
    pub total_pages: u64,
    pub total_items: u64,
    /// `true` when `total_items` is extrapolated rather than counted.
    pub estimated: bool,
}

impl Pagination {
    pub fn exact(request: PageRequest, total_items: u64) -> Self {
        Self::build(request, total_items, false)
    }

    pub fn estimated(request: PageRequest, total_items: u64) -> Self {
        Self::build(request, total_items, true)
    }

    fn build(request: PageRequest, total_items: u64, estimated: bool) -> Self {
        Self {
            current_page: request.page,
            total_pages: total_items.div_ceil(request.page_size),
            total_items,
            estimated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    pub source: DataSource,
}
