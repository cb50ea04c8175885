//! Pagination types shared by list queries

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
        }
    }
}

impl ListParams {
    /// Clamp to page >= 1 and 1 <= page_size <= 100
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            page_size: params.page_size,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 || self.total <= 0 {
            return 0;
        }
        ((self.total as u64 + self.page_size as u64 - 1) / self.page_size as u64) as u32
    }
}
