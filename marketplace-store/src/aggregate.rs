//! Count and sum across whichever backend is live
//!
//! The [`AggregateGateway`] answers dashboard-style questions with a definite
//! number. It asks the relational handle if it is live, else the document
//! handle, else the degraded counters. A backend error is logged and answered
//! from the counters as well, as is every call while the database is marked
//! disabled.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! ```

use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::Document;

use crate::config::RepositoryConfig;
use crate::degraded::{CounterKey, DegradedCounters};
use crate::dialect::ModelHandle;
use crate::error::{DatabaseError, DatabaseOperation, Error, Result};
use crate::repository::{
    Entity, FilterDescription, Orders, Products, RepositoryError, RepositoryOperation, Users,
};
use crate::translate::{
    document, normalize, relational, to_sql_where, ColumnSet, DocumentQuery, SqlWhere,
    DEFAULT_DATE_FIELDS,
};

/// Field whose sum is answered by the revenue counter
pub const DEFAULT_REVENUE_FIELD: &str = "totalAmount";

/// Backend-agnostic count and sum
#[derive(Debug, Clone)]
pub struct AggregateGateway {
    counters: Arc<DegradedCounters>,
    revenue_field: String,
    query_timeout: Duration,
}

impl AggregateGateway {
    pub fn new(counters: Arc<DegradedCounters>) -> Self {
        let defaults = RepositoryConfig::default();
        Self {
            counters,
            revenue_field: defaults.revenue_field.clone(),
            query_timeout: defaults.query_timeout(),
        }
    }

    /// Take revenue field and timeout from `settings`
    #[must_use]
    pub fn with_settings(mut self, settings: &RepositoryConfig) -> Self {
        self.revenue_field = settings.revenue_field.clone();
        self.query_timeout = settings.query_timeout();
        self
    }

    pub fn counters(&self) -> &Arc<DegradedCounters> {
        &self.counters
    }

    /// Number of records of `entity_key` matching `filter`
    ///
    /// Without a live backend this is the counter for `entity_key`, or `0`
    /// when the key is not tracked.
    pub async fn count(&self, entity_key: &str, handle: &ModelHandle, filter: &FilterDescription) -> u64 {
        match self.live_count(Scope::keyed(entity_key), handle, filter).await {
            Some(total) => total,
            None => counter_as_count(self.counters.value(entity_key)),
        }
    }

    /// [`count`](Self::count) for `E`, falling back to `E::COUNTER`
    pub async fn count_of<E: Entity>(&self, handle: &ModelHandle, filter: &FilterDescription) -> u64 {
        match self.live_count(Scope::of::<E>(), handle, filter).await {
            Some(total) => total,
            None => counter_as_count(self.counters.get(E::COUNTER)),
        }
    }

    /// Sum of `field` over records of `entity_key` matching `filter`
    ///
    /// Without a live backend only the revenue field has an answer (the
    /// revenue counter); any other field sums to `0`.
    pub async fn sum(
        &self,
        entity_key: &str,
        handle: &ModelHandle,
        field: &str,
        filter: &FilterDescription,
    ) -> f64 {
        match self.live_sum(Scope::keyed(entity_key), handle, field, filter).await {
            Some(total) => total,
            None => self.fallback_sum(field),
        }
    }

    pub async fn sum_of<E: Entity>(&self, handle: &ModelHandle, field: &str, filter: &FilterDescription) -> f64 {
        match self.live_sum(Scope::of::<E>(), handle, field, filter).await {
            Some(total) => total,
            None => self.fallback_sum(field),
        }
    }

    /// `None` sends the caller to the counters
    async fn live_count(&self, scope: Scope<'_>, handle: &ModelHandle, filter: &FilterDescription) -> Option<u64> {
        if !self.counters.is_db_available() {
            return None;
        }
        self.backend_count(scope, handle, filter)
            .await
            .unwrap_or_else(|err| {
                self.log_fallback(scope.key, RepositoryOperation::Count, &err);
                None
            })
    }

    async fn live_sum(
        &self,
        scope: Scope<'_>,
        handle: &ModelHandle,
        field: &str,
        filter: &FilterDescription,
    ) -> Option<f64> {
        if !self.counters.is_db_available() {
            return None;
        }
        self.backend_sum(scope, handle, field, filter)
            .await
            .unwrap_or_else(|err| {
                self.log_fallback(scope.key, RepositoryOperation::Sum, &err);
                None
            })
    }

    fn fallback_sum(&self, field: &str) -> f64 {
        if field == self.revenue_field {
            self.counters.get(CounterKey::Revenue)
        } else {
            0.0
        }
    }

    /// `None` when no handle is live
    async fn backend_count(
        &self,
        scope: Scope<'_>,
        handle: &ModelHandle,
        filter: &FilterDescription,
    ) -> Result<Option<u64>> {
        let (filter, search) = filter.split_search();
        let filter = normalize(&filter, scope.date_fields);
        if let Some(store) = handle.live_relational() {
            let clause = scope.sql_where(&filter, search.as_deref(), store.columns());
            return self.bounded(store.count(&clause)).await.map(Some);
        }
        if let Some(store) = handle.live_document() {
            return self
                .bounded(store.count_documents(scope.document_filter(&filter, search.as_deref())))
                .await
                .map(Some);
        }
        Ok(None)
    }

    async fn backend_sum(
        &self,
        scope: Scope<'_>,
        handle: &ModelHandle,
        field: &str,
        filter: &FilterDescription,
    ) -> Result<Option<f64>> {
        let (filter, search) = filter.split_search();
        let filter = normalize(&filter, scope.date_fields);
        if let Some(store) = handle.live_relational() {
            if !store.columns().contains(field) {
                return Err(Error::Database(
                    DatabaseError::query_failed(
                        DatabaseOperation::Aggregate,
                        format!("column \"{field}\" is not in the allow-list"),
                    )
                    .add_context(store.table().to_string()),
                ));
            }
            let clause = scope.sql_where(&filter, search.as_deref(), store.columns());
            return self.bounded(store.sum(field, &clause)).await.map(Some);
        }
        if let Some(store) = handle.live_document() {
            if field.starts_with('$') {
                return Err(Error::Document(DatabaseError::query_failed(
                    DatabaseOperation::Aggregate,
                    format!("invalid field name \"{field}\""),
                )));
            }
            return self
                .bounded(store.sum(field, scope.document_filter(&filter, search.as_deref())))
                .await
                .map(Some);
        }
        Ok(None)
    }

    async fn bounded<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.query_timeout, call)
            .await
            .unwrap_or(Err(Error::Timeout(self.query_timeout)))
    }

    fn log_fallback(&self, entity_key: &str, operation: RepositoryOperation, err: &Error) {
        let error = RepositoryError::from_backend(operation, err).for_entity(entity_key);
        tracing::error!(
            entity = entity_key,
            operation = %operation,
            kind = %error.kind,
            error = %error.message,
            "aggregate failed, answering from degraded counters"
        );
    }
}

/// Search and date fields of the entity being aggregated
#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    key: &'a str,
    search_fields: &'static [&'static str],
    date_fields: &'static [&'static str],
}

impl<'a> Scope<'a> {
    fn of<E: Entity>() -> Self {
        Self {
            key: E::PLURAL,
            search_fields: E::SEARCH_FIELDS,
            date_fields: E::DATE_FIELDS,
        }
    }

    /// Unknown keys search no fields, so a `search` term matches nothing
    fn keyed(key: &'a str) -> Self {
        if key == Users::PLURAL {
            Self::of::<Users>()
        } else if key == Products::PLURAL {
            Self::of::<Products>()
        } else if key == Orders::PLURAL {
            Self::of::<Orders>()
        } else {
            Self {
                key,
                search_fields: &[],
                date_fields: DEFAULT_DATE_FIELDS,
            }
        }
    }

    fn sql_where(&self, filter: &FilterDescription, search: Option<&str>, columns: &ColumnSet) -> SqlWhere {
        let mut clause = to_sql_where(filter, columns);
        if let Some(term) = search {
            clause.push(relational::text_search(term, self.search_fields, columns));
        }
        clause
    }

    fn document_filter(&self, filter: &FilterDescription, search: Option<&str>) -> Document {
        let mut query = DocumentQuery::from_filter(filter);
        if let Some(term) = search {
            query.push_any(document::text_search(term, self.search_fields));
        }
        query.into_document()
    }
}

fn counter_as_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
