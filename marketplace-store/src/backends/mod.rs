//! Driver-backed store implementations
//!
//! - [`PgTable`]: a PostgreSQL table through a shared `sqlx` pool
//! - [`MongoCollection`]: a MongoDB collection through the official driver

mod mongo;
mod postgres;

pub use mongo::MongoCollection;
pub use postgres::{push_where, quote_ident, PgTable};
