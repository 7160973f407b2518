//! Backend store traits
//!
//! One trait per storage dialect. Repositories and the aggregate gateway hold
//! them as `Arc<dyn ...>` inside a [`ModelHandle`](crate::dialect::ModelHandle)
//! and never see the concrete driver.
//!
//! # Available Backends
//!
//! - [`RelationalStore`]: [`PgTable`](crate::backends::PgTable) (PostgreSQL via
//!   `sqlx`), [`MemoryTable`](crate::memory::MemoryTable)
//! - [`DocumentStore`]: [`MongoCollection`](crate::backends::MongoCollection),
//!   [`MemoryCollection`](crate::memory::MemoryCollection)
//!
//! Stores return raw errors; the repository boundary turns them into
//! envelopes.

use async_trait::async_trait;
use mongodb::bson::Document;
use serde_json::{Map, Value};

use super::pagination::{OrderDirection, Pagination};
use crate::error::Result;
use crate::translate::{ColumnSet, SqlWhere};

/// A row or document as seen by callers
pub type Record = Map<String, Value>;

/// Ordering requested from a relational store
pub type OrderBy<'a> = Option<(&'a str, OrderDirection)>;

/// Schema-rigid table backend
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Table name, for logs
    fn table(&self) -> &str;

    /// Allow-list of column names from the live schema
    fn columns(&self) -> &ColumnSet;

    /// Whether the handle finished initializing
    fn is_ready(&self) -> bool {
        true
    }

    /// Rows matching `filter`, ordered and windowed
    async fn select(
        &self,
        filter: &SqlWhere,
        order: OrderBy<'_>,
        window: Pagination,
    ) -> Result<Vec<Record>>;

    async fn count(&self, filter: &SqlWhere) -> Result<u64>;

    /// Sum of `column` over matching rows, `0` when none match
    async fn sum(&self, column: &str, filter: &SqlWhere) -> Result<f64>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>>;

    /// Insert allow-listed `values` and return the stored row
    async fn insert(&self, values: Record) -> Result<Record>;

    /// Apply `values` to the row with `id`; `None` when no such row
    async fn update(&self, id: &str, values: Record) -> Result<Option<Record>>;

    /// `true` when a row was removed
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// Schema-flexible collection backend
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Collection name, for logs
    fn collection(&self) -> &str;

    /// Whether the handle finished initializing
    fn is_ready(&self) -> bool {
        true
    }

    /// Documents matching `filter` as records, sorted and windowed
    async fn find(&self, filter: Document, sort: Document, window: Pagination)
        -> Result<Vec<Record>>;

    async fn count_documents(&self, filter: Document) -> Result<u64>;

    /// Sum of `field` over matching documents, `0` when none match
    async fn sum(&self, field: &str, filter: Document) -> Result<f64>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>>;

    /// Insert and return the stored document as a record
    async fn insert_one(&self, document: Document) -> Result<Record>;

    /// `$set` `changes` on the document with `id`; `None` when no such document
    async fn update_by_id(&self, id: &str, changes: Document) -> Result<Option<Record>>;

    /// `true` when a document was removed
    async fn delete_by_id(&self, id: &str) -> Result<bool>;
}
