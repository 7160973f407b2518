//! Pagination and ordering types for repository queries
//!
//! Callers speak in pages ([`PageRequest`]); backends speak in offset/limit
//! windows ([`Pagination`]). List responses carry a [`PaginationResult`].
//!
//! # Example
//!
//! ```rust
//! use marketplace_store::repository::{PageRequest, PaginationResult};
//!
//! let request = PageRequest::new(2, 10);
//! let window = request.window();
//! assert_eq!(window.offset, 10);
//! assert_eq!(window.limit, 10);
//!
//! let result = PaginationResult::new(&request, 25);
//! assert_eq!(result.pages, 3);
//! assert_eq!(result.current, 2);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Items per page when the caller does not say
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Upper bound on items per page unless configured otherwise
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl OrderDirection {
    /// Value for this direction in a MongoDB sort document
    pub const fn sort_value(&self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Offset/limit window handed to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Window for a 1-indexed page number
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1).saturating_mul(page_size);
        Self {
            offset,
            limit: page_size,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Page requested by a caller, 1-indexed
///
/// Values below 1 are raised to 1 on construction; the upper bound on `limit`
/// is applied by the repository from its configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
        }
    }

    /// Cap `limit` at `max_limit`
    #[must_use]
    pub fn clamped(self, max_limit: u64) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, max_limit.max(1)),
        }
    }

    /// Backend window for this page
    pub fn window(&self) -> Pagination {
        Pagination::page(self.page, self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_SIZE
}

/// Pagination block of a list response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationResult {
    /// The page that was requested
    pub current: u64,
    /// `ceil(total / limit)`
    pub pages: u64,
    /// Matching records across all pages
    pub total: u64,
}

impl PaginationResult {
    pub fn new(request: &PageRequest, total: u64) -> Self {
        Self {
            current: request.page,
            pages: total.div_ceil(request.limit.max(1)),
            total,
        }
    }

    /// Result for a backend-less list: nothing found, page echoed
    pub fn empty(request: &PageRequest) -> Self {
        Self::new(request, 0)
    }
}
