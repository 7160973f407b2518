//! # marketplace-store
//!
//! Persistence layer for the marketplace: one repository contract over a
//! PostgreSQL table or a MongoDB collection, chosen per entity at startup.
//!
//! ## Features
//!
//! - **Dual dialect**: each entity binds to a relational or a document backend,
//!   relational first, and keeps that choice for its lifetime
//! - **Filter translation**: one semantic filter description rendered as a
//!   parameterized `WHERE` clause or a MongoDB filter document
//! - **Repositories**: paging, free-text search, credential stripping and
//!   finders for users, products and orders, all answering with a
//!   `{success, data, error}` envelope instead of `Err`
//! - **Aggregates**: count and sum with a degraded-mode fallback to
//!   in-process counters
//! - **Bootstrap**: figment configuration, retrying connections, readiness
//!   probes
//!
//! ## Example
//!
//! ```rust,no_run
//! use marketplace_store::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let store = Persistence::builder()
//!         .config(config)
//!         .without_tracing()
//!         .build()
//!         .await?;
//!
//!     let shoes = store
//!         .products()
//!         .get_products_by_category("shoes", PageRequest::new(1, 20))
//!         .await;
//!     println!("{}", serde_json::to_string(&shoes).unwrap_or_default());
//!
//!     let revenue = store.sum::<Orders>("totalAmount", &FilterDescription::new()).await;
//!     println!("revenue: {revenue}");
//!
//!     store.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod backends;
pub mod config;
pub mod database;
pub mod degraded;
pub mod dialect;
pub mod document_store;
pub mod error;
pub mod health;
pub mod memory;
pub mod observability;
pub mod repository;
pub mod responses;
pub mod state;
pub mod translate;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::aggregate::AggregateGateway;
    pub use crate::config::{Config, DatabaseConfig, DocumentStoreConfig, RepositoryConfig};
    pub use crate::degraded::{CounterKey, CounterSnapshot, DegradedCounters};
    pub use crate::dialect::{Backend, Dialect, ModelHandle};
    pub use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
    pub use crate::health::{DependencyStatus, PersistenceHealth};
    pub use crate::observability::init_tracing;
    pub use crate::repository::{
        DocumentStore, Entity, FilterDescription, FilterOperator, FilterValue, OrderDirection,
        OrderRepository, Orders, PageRequest, PaginationResult, ProductRepository, Products,
        Record, RelationalStore, Repository, RepositoryError, UserRepository, Users,
    };
    pub use crate::responses::{ListPage, ResultEnvelope};
    pub use crate::state::{Persistence, PersistenceBuilder};

    #[cfg(feature = "http")]
    pub use crate::health::{health, readiness};
}
