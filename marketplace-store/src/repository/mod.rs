//! Entity repositories over either storage dialect
//!
//! This module holds the caller-facing persistence API: backend-agnostic
//! filters ([`FilterDescription`]), paging ([`PageRequest`]), the store traits
//! each backend implements, and the generic [`Repository`] bound to one
//! [`Entity`].
//!
//! # Features
//!
//! - **Dual dialect**: one API over [`RelationalStore`] and [`DocumentStore`]
//! - **Filtering**: [`FilterDescription`] with `gte`/`lte`/`gt`/`lt`/`ne`/`in`/`or`
//! - **Search**: a `search` filter key matched across each entity's text fields
//! - **Pagination**: [`PageRequest`] in, [`PaginationResult`] out
//! - **Envelopes**: every call returns a [`ResultEnvelope`](crate::responses::ResultEnvelope)
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use marketplace_store::degraded::DegradedCounters;
//! use marketplace_store::dialect::ModelHandle;
//! use marketplace_store::memory::MemoryTable;
//! use marketplace_store::repository::{FilterDescription, FilterOperator, PageRequest, ProductRepository};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let table = Arc::new(MemoryTable::new("products", ["id", "name", "category", "price", "createdAt"]));
//! let counters = Arc::new(DegradedCounters::new());
//! counters.enable_db();
//!
//! let products = ProductRepository::new(&ModelHandle::relational(table), counters);
//! let created = products
//!     .create(json!({"name": "Chelsea boot", "category": "shoes", "price": 120}).as_object().unwrap().clone())
//!     .await;
//! assert!(created.success);
//!
//! let filter = FilterDescription::new()
//!     .eq("search", "boot")
//!     .compare("price", FilterOperator::GreaterThanOrEqual, 100);
//! let page = products.get_all(&filter, PageRequest::new(1, 10)).await.into_data().unwrap();
//! assert_eq!(page.pagination.total, 1);
//! # });
//! ```

mod crud;
mod entity;
mod error;
mod filter;
mod finders;
mod pagination;
mod traits;

pub use crud::Repository;
pub use entity::{Entity, Orders, Products, Users, CREDENTIAL_FIELDS, IMMUTABLE_FIELDS};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use filter::{
    Comparison, Constraint, FilterDescription, FilterOperator, FilterValue, Operand, SEARCH_KEY,
};
pub use finders::{OrderRepository, ProductRepository, UserRepository};
pub use pagination::{
    OrderDirection, PageRequest, Pagination, PaginationResult, DEFAULT_MAX_PAGE_SIZE,
    DEFAULT_PAGE_SIZE,
};
pub use traits::{DocumentStore, OrderBy, Record, RelationalStore};
