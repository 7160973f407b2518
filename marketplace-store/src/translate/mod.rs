//! Predicate translation for both storage dialects
//!
//! A caller's [`FilterDescription`](crate::repository::FilterDescription) is
//! first [normalized](normalize::normalize) (blank values pruned, date fields
//! coerced) and then rendered for exactly one dialect:
//!
//! - [`relational`]: an [`SqlWhere`] restricted to a table's allow-listed
//!   columns
//! - [`document`]: a MongoDB filter document using `$`-operators
//!
//! Translation never fails. Anything ambiguous narrows the filter or drops
//! the clause.
//!
//! # Example
//!
//! ```rust
//! use marketplace_store::repository::FilterDescription;
//! use marketplace_store::translate::{normalize, to_document_filter, to_sql_where, ColumnSet};
//! use serde_json::json;
//!
//! let filter = FilterDescription::from_json(&json!({
//!     "createdAt": { "gte": "2024-01-01T00:00:00Z" },
//!     "role": "",
//! }));
//! let normalized = normalize(&filter, &["createdAt", "updatedAt"]);
//!
//! let document = to_document_filter(&normalized);
//! assert!(document.contains_key("createdAt"));
//! assert!(!document.contains_key("role"));
//!
//! // the relational allow-list lacks createdAt, so nothing survives
//! let clause = to_sql_where(&normalized, &ColumnSet::new(["id", "email"]));
//! assert!(clause.is_empty());
//! ```

pub mod codec;
pub mod document;
pub mod normalize;
pub mod relational;

pub use document::{to_document_filter, DocumentQuery};
pub use normalize::{normalize, parse_timestamp, DEFAULT_DATE_FIELDS};
pub use relational::{to_sql_where, ColumnSet, SqlOperator, SqlPredicate, SqlWhere};
