//! Shared pagination envelope for list endpoints.

use serde::{Deserialize, Serialize};

/// Page window accepted by list endpoints as query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "PageQuery::default_page")]
    pub page: u64,
    #[serde(default = "PageQuery::default_per_page")]
    pub per_page: u64,
}

impl PageQuery {
    const MAX_PER_PAGE: u64 = 100;

    fn default_page() -> u64 {
        1
    }

    fn default_per_page() -> u64 {
        10
    }

    pub fn limit(&self) -> u64 {
        self.per_page.clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        self.page.max(1).saturating_sub(1) * self.limit()
    }
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: Self::default_page(),
            per_page: Self::default_per_page(),
        }
    }
}

/// Standard envelope for paginated responses.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub items: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(total: u64, query: &PageQuery, items: Vec<T>) -> Self {
        Self {
            total,
            page: query.page.max(1),
            per_page: query.limit(),
            items,
        }
    }
}
