//! Common types used across the engine

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, 500))
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.limit() as u64;
        Self {
            data,
            pagination: PaginationMeta {
                page: pagination.page,
                per_page: per_page as u32,
                total_items,
                total_pages: total_items.div_ceil(per_page) as u32,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

/// Scope of a CLI or API state filter: one state or every state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateFilter {
    All,
    Only(String),
}

impl StateFilter {
    pub fn matches(&self, state: Option<&str>) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Only(wanted) => state.is_some_and(|s| s.eq_ignore_ascii_case(wanted)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_meta() {
        let page = Pagination { page: 2, per_page: 20 };
        assert_eq!(page.offset(), 20);
        let resp = PaginatedResponse::new(vec![1, 2, 3], &page, 41);
        assert_eq!(resp.pagination.total_pages, 3);
    }

    #[test]
    fn test_state_filter() {
        assert!(StateFilter::All.matches(None));
        let lagos = StateFilter::Only("Lagos".to_string());
        assert!(lagos.matches(Some("lagos")));
        assert!(!lagos.matches(Some("Kano")));
        assert!(!lagos.matches(None));
    }
}
