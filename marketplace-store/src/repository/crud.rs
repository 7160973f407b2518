//! Dual-dialect repository
//!
//! A [`Repository`] resolves its [`Backend`] once, at construction, and keeps
//! it for its whole lifetime. Every call then dispatches on that dialect,
//! translates filters for it, races the backend call against cancellation and
//! the query timeout, and folds the outcome into a [`ResultEnvelope`]. Backend
//! errors are logged here and never returned as `Err`.
//!
//! When no backend is live, or the counter store reports the database
//! disabled, reads answer empty and writes succeed with no `data` and an
//! explanatory `message`.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use marketplace_store::degraded::DegradedCounters;
//! use marketplace_store::dialect::ModelHandle;
//! use marketplace_store::repository::{FilterDescription, PageRequest, ProductRepository};
//! use serde_json::json;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let counters = Arc::new(DegradedCounters::new());
//! let products = ProductRepository::new(&ModelHandle::none(), counters);
//!
//! let page = products.get_all(&FilterDescription::new().eq("category", "shoes"), PageRequest::default()).await;
//! assert_eq!(
//!     serde_json::to_value(&page).unwrap(),
//!     json!({"success": true, "data": {"products": [], "pagination": {"current": 1, "pages": 0, "total": 0}}})
//! );
//! # });
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use mongodb::bson::doc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::entity::{Entity, CREDENTIAL_FIELDS, IMMUTABLE_FIELDS};
use super::error::{RepositoryError, RepositoryOperation};
use super::filter::FilterDescription;
use super::pagination::{OrderDirection, PageRequest, Pagination, PaginationResult};
use super::traits::Record;
use crate::config::RepositoryConfig;
use crate::degraded::DegradedCounters;
use crate::dialect::{Backend, Dialect, ModelHandle};
use crate::error::{Error, Result};
use crate::responses::{ListPage, ResultEnvelope};
use crate::translate::codec::record_to_document;
use crate::translate::{document, normalize, relational, to_sql_where, DocumentQuery};

const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

/// CRUD, search and pagination for one entity
pub struct Repository<E: Entity> {
    backend: Backend,
    counters: Arc<DegradedCounters>,
    settings: RepositoryConfig,
    cancel: CancellationToken,
    _entity: PhantomData<E>,
}

impl<E: Entity> Repository<E> {
    /// Bind to whichever backend of `handle` is live right now
    pub fn new(handle: &ModelHandle, counters: Arc<DegradedCounters>) -> Self {
        let backend = handle.resolve();
        tracing::debug!(entity = E::NAME, dialect = %backend.dialect(), "repository bound");
        Self {
            backend,
            counters,
            settings: RepositoryConfig::default(),
            cancel: CancellationToken::new(),
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RepositoryConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Abort in-flight calls when `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Dialect fixed at construction
    pub fn dialect(&self) -> Dialect {
        self.backend.dialect()
    }

    pub fn settings(&self) -> &RepositoryConfig {
        &self.settings
    }

    /// Paged list of records matching `filters`, newest first
    pub async fn get_all(
        &self,
        filters: &FilterDescription,
        page: PageRequest,
    ) -> ResultEnvelope<ListPage> {
        let page = page.clamped(self.settings.max_limit);
        let Some(backend) = self.live_backend() else {
            return self.empty_page(page);
        };
        match self.guard(self.query(backend, filters, page.window(), true)).await {
            Ok((records, total)) => ResultEnvelope::success(ListPage::new(
                E::PLURAL,
                records.into_iter().map(redact::<E>).collect(),
                PaginationResult::new(&page, total),
            )),
            Err(err) => self.fail(RepositoryOperation::FindAll, None, &err),
        }
    }

    /// Single record by id; a miss is `{success: false, data: null}`
    pub async fn get_by_id(&self, id: &str) -> ResultEnvelope<Record> {
        let Some(backend) = self.live_backend() else {
            return ResultEnvelope::not_found();
        };
        match self.guard(read_by_id(backend, id)).await {
            Ok(Some(record)) => ResultEnvelope::success(redact::<E>(record)),
            Ok(None) => ResultEnvelope::not_found(),
            Err(err) => self.fail(RepositoryOperation::FindById, Some(id), &err),
        }
    }

    /// First record matching `filters`, newest first
    pub async fn find_one(&self, filters: &FilterDescription) -> ResultEnvelope<Record> {
        let Some(backend) = self.live_backend() else {
            return ResultEnvelope::not_found();
        };
        match self
            .guard(self.query(backend, filters, Pagination::new(0, 1), false))
            .await
        {
            Ok((records, _)) => match records.into_iter().next() {
                Some(record) => ResultEnvelope::success(redact::<E>(record)),
                None => ResultEnvelope::not_found(),
            },
            Err(err) => self.fail(RepositoryOperation::FindOne, None, &err),
        }
    }

    /// Insert `record`, stamping `createdAt`/`updatedAt`
    ///
    /// A caller-supplied `createdAt` is kept.
    pub async fn create(&self, record: Record) -> ResultEnvelope<Record> {
        let Some(backend) = self.live_backend() else {
            return self.unavailable(RepositoryOperation::Create);
        };
        let mut values = record;
        values.remove("id");
        values.remove("_id");
        let now = timestamp_now();
        if values.get(CREATED_AT).map_or(true, Value::is_null) {
            values.insert(CREATED_AT.to_string(), now.clone());
        }
        values.insert(UPDATED_AT.to_string(), now);

        let outcome = match backend {
            Backend::Relational(store) => {
                let columns = store.columns();
                values.retain(|field, _| columns.contains(field));
                self.guard(store.insert(values)).await
            }
            Backend::Document(store) => {
                let document = record_to_document(&values, E::DATE_FIELDS);
                self.guard(store.insert_one(document)).await
            }
            Backend::Unavailable => return self.unavailable(RepositoryOperation::Create),
        };
        match outcome {
            Ok(created) => ResultEnvelope::success(redact::<E>(created)),
            Err(err) => self.fail(RepositoryOperation::Create, None, &err),
        }
    }

    /// Apply `partial` to the record with `id`
    ///
    /// Credentials and identity fields are always stripped first. If nothing
    /// is left to write the current record is returned unchanged.
    pub async fn update(&self, id: &str, partial: Record) -> ResultEnvelope<Record> {
        let Some(backend) = self.live_backend() else {
            return self.unavailable(RepositoryOperation::Update);
        };
        let mut changes = strip_protected(partial);

        let outcome = match backend {
            Backend::Relational(store) => {
                let columns = store.columns();
                changes.retain(|field, _| columns.contains(field));
                if changes.is_empty() {
                    return self.get_by_id(id).await;
                }
                if columns.contains(UPDATED_AT) {
                    changes.insert(UPDATED_AT.to_string(), timestamp_now());
                }
                self.guard(store.update(id, changes)).await
            }
            Backend::Document(store) => {
                if changes.is_empty() {
                    return self.get_by_id(id).await;
                }
                changes.insert(UPDATED_AT.to_string(), timestamp_now());
                let document = record_to_document(&changes, E::DATE_FIELDS);
                self.guard(store.update_by_id(id, document)).await
            }
            Backend::Unavailable => return self.unavailable(RepositoryOperation::Update),
        };
        match outcome {
            Ok(Some(updated)) => ResultEnvelope::success(redact::<E>(updated)),
            Ok(None) => ResultEnvelope::not_found().with_message(format!("{} not found", E::NAME)),
            Err(err) => self.fail(RepositoryOperation::Update, Some(id), &err),
        }
    }

    /// Remove the record with `id`; `data` is `true` when one was removed
    pub async fn delete(&self, id: &str) -> ResultEnvelope<bool> {
        let Some(backend) = self.live_backend() else {
            return self.unavailable(RepositoryOperation::Delete);
        };
        let outcome = match backend {
            Backend::Relational(store) => self.guard(store.delete(id)).await,
            Backend::Document(store) => self.guard(store.delete_by_id(id)).await,
            Backend::Unavailable => return self.unavailable(RepositoryOperation::Delete),
        };
        match outcome {
            Ok(true) => ResultEnvelope::success(true),
            Ok(false) => ResultEnvelope::not_found().with_message(format!("{} not found", E::NAME)),
            Err(err) => self.fail(RepositoryOperation::Delete, Some(id), &err),
        }
    }

    /// `{success: true}` with no records on `page`
    pub(crate) fn empty_page(&self, page: PageRequest) -> ResultEnvelope<ListPage> {
        let page = page.clamped(self.settings.max_limit);
        ResultEnvelope::success(ListPage::new(E::PLURAL, Vec::new(), PaginationResult::empty(&page)))
    }

    fn live_backend(&self) -> Option<&Backend> {
        match self.backend {
            Backend::Unavailable => None,
            _ if !self.counters.is_db_available() => None,
            _ => Some(&self.backend),
        }
    }

    async fn query(
        &self,
        backend: &Backend,
        filters: &FilterDescription,
        window: Pagination,
        with_total: bool,
    ) -> Result<(Vec<Record>, u64)> {
        let (filters, search) = filters.split_search();
        let filters = normalize(&filters, E::DATE_FIELDS);
        match backend {
            Backend::Relational(store) => {
                let columns = store.columns();
                let mut clause = to_sql_where(&filters, columns);
                if let Some(term) = search.as_deref() {
                    clause.push(relational::text_search(term, E::SEARCH_FIELDS, columns));
                }
                let order = columns
                    .contains(CREATED_AT)
                    .then_some((CREATED_AT, OrderDirection::Descending));
                let total = if with_total { store.count(&clause).await? } else { 0 };
                let records = store.select(&clause, order, window).await?;
                Ok((records, total))
            }
            Backend::Document(store) => {
                let mut query = DocumentQuery::from_filter(&filters);
                if let Some(term) = search.as_deref() {
                    query.push_any(document::text_search(term, E::SEARCH_FIELDS));
                }
                let filter = query.into_document();
                let total = if with_total {
                    store.count_documents(filter.clone()).await?
                } else {
                    0
                };
                let sort = doc! { CREATED_AT: OrderDirection::Descending.sort_value() };
                let records = store.find(filter, sort, window).await?;
                Ok((records, total))
            }
            Backend::Unavailable => Ok((Vec::new(), 0)),
        }
    }

    /// Race `call` against cancellation and the query timeout
    async fn guard<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.settings.query_timeout();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(timeout)),
            },
        }
    }

    fn fail<T>(&self, operation: RepositoryOperation, id: Option<&str>, err: &Error) -> ResultEnvelope<T> {
        let mut error = RepositoryError::from_backend(operation, err).for_entity(E::NAME);
        if let Some(id) = id {
            error = error.with_entity_id(id);
        }
        tracing::error!(
            entity = E::NAME,
            operation = %operation,
            kind = %error.kind,
            dialect = %self.backend.dialect(),
            entity_id = error.entity_id.as_deref(),
            retriable = error.is_retriable(),
            error = %error.message,
            "repository operation failed"
        );
        ResultEnvelope::failure(error.message)
    }

    fn unavailable<T>(&self, operation: RepositoryOperation) -> ResultEnvelope<T> {
        let unavailable = RepositoryError::unavailable(operation, E::NAME);
        tracing::warn!(
            entity = E::NAME,
            operation = %operation,
            "write skipped, no backend available"
        );
        ResultEnvelope::empty().with_message(unavailable.message)
    }
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            counters: Arc::clone(&self.counters),
            settings: self.settings.clone(),
            cancel: self.cancel.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &E::NAME)
            .field("backend", &self.backend)
            .finish()
    }
}

async fn read_by_id(backend: &Backend, id: &str) -> Result<Option<Record>> {
    match backend {
        Backend::Relational(store) => store.find_by_id(id).await,
        Backend::Document(store) => store.find_by_id(id).await,
        Backend::Unavailable => Ok(None),
    }
}

fn strip_protected(mut partial: Record) -> Record {
    for field in CREDENTIAL_FIELDS.iter().chain(IMMUTABLE_FIELDS) {
        partial.remove(*field);
    }
    partial
}

fn redact<E: Entity>(mut record: Record) -> Record {
    for field in E::HIDDEN_FIELDS {
        record.remove(*field);
    }
    record
}

fn timestamp_now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCollection, MemoryTable};
    use crate::repository::{Orders, Products, Users};
    use std::time::Duration;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    fn online() -> Arc<DegradedCounters> {
        let counters = Arc::new(DegradedCounters::new());
        counters.enable_db();
        counters
    }

    fn user_table() -> Arc<MemoryTable> {
        Arc::new(MemoryTable::new(
            "users",
            ["id", "name", "email", "role", "password", "createdAt", "updatedAt"],
        ))
    }

    #[tokio::test]
    async fn test_no_backend_list_is_empty_success() {
        let repo = Repository::<Products>::new(&ModelHandle::none(), online());
        let envelope = repo
            .get_all(&FilterDescription::new().eq("category", "shoes"), PageRequest::new(3, 5))
            .await;
        assert!(envelope.success);
        let page = envelope.into_data().unwrap();
        assert!(page.is_empty());
        assert_eq!(page.pagination, PaginationResult { current: 3, pages: 0, total: 0 });
    }

    #[tokio::test]
    async fn test_no_backend_writes_succeed_empty_without_counting() {
        let counters = online();
        let repo = Repository::<Users>::new(&ModelHandle::none(), Arc::clone(&counters));
        let created = repo.create(record(json!({"name": "Ada"}))).await;
        assert!(created.success);
        assert!(created.data.is_none());
        assert!(created.error.is_none());
        assert_eq!(created.message.as_deref(), Some("User storage is unavailable"));
        assert_eq!(counters.get(crate::degraded::CounterKey::Users), 0.0);

        let updated = repo.update("1", record(json!({"password": "x"}))).await;
        assert!(updated.success && updated.data.is_none());
        let deleted = repo.delete("1").await;
        assert_eq!(
            serde_json::to_value(&deleted).unwrap(),
            json!({"success": true, "data": null, "message": "User storage is unavailable"})
        );
    }

    #[tokio::test]
    async fn test_disabled_db_behaves_as_no_backend() {
        let counters = Arc::new(DegradedCounters::new());
        let table = user_table();
        table.seed([record(json!({"name": "Ada"}))]).await;
        let repo = Repository::<Users>::new(&ModelHandle::relational(table), counters);
        assert_eq!(repo.dialect(), Dialect::Relational);
        let envelope = repo.get_all(&FilterDescription::new(), PageRequest::default()).await;
        assert!(envelope.success);
        assert_eq!(envelope.data().map(ListPage::len), Some(0));
    }

    #[tokio::test]
    async fn test_relational_create_stamps_and_redacts() {
        let repo = Repository::<Users>::new(&ModelHandle::relational(user_table()), online());
        let created = repo
            .create(record(json!({
                "name": "Ada",
                "email": "ada@example.com",
                "password": "hash",
                "nickname": "dropped"
            })))
            .await;
        assert!(created.success);
        let user = created.into_data().unwrap();
        assert!(user.get("password").is_none());
        assert!(user.get("nickname").is_none());
        assert!(user["createdAt"].is_string());
        assert_eq!(user["createdAt"], user["updatedAt"]);
    }

    #[tokio::test]
    async fn test_update_strips_credentials() {
        let table = user_table();
        table
            .seed([record(json!({"name": "Ada", "password": "original"}))])
            .await;
        let repo = Repository::<Users>::new(&ModelHandle::relational(table.clone()), online());
        let updated = repo
            .update("1", record(json!({"password": "x", "name": "y"})))
            .await;
        assert!(updated.success);
        assert_eq!(updated.data().unwrap()["name"], json!("y"));

        let stored = table.rows().await;
        assert_eq!(stored[0]["password"], json!("original"));
        assert_eq!(stored[0]["name"], json!("y"));
    }

    #[tokio::test]
    async fn test_empty_update_returns_current_record() {
        let table = user_table();
        table
            .seed([record(json!({"name": "Ada", "updatedAt": "2024-01-01T00:00:00.000Z"}))])
            .await;
        let repo = Repository::<Users>::new(&ModelHandle::relational(table.clone()), online());
        let updated = repo
            .update("1", record(json!({"password": "x", "id": "9"})))
            .await;
        assert!(updated.success);
        assert_eq!(
            updated.data().unwrap()["updatedAt"],
            json!("2024-01-01T00:00:00.000Z")
        );
        assert_eq!(table.rows().await[0]["updatedAt"], json!("2024-01-01T00:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let repo = Repository::<Products>::new(
            &ModelHandle::document(Arc::new(MemoryCollection::new("products"))),
            online(),
        );
        let updated = repo
            .update("65a1f0c2e4b0a1b2c3d4e5f6", record(json!({"name": "x"})))
            .await;
        assert!(!updated.success);
        assert!(updated.error.is_none());
        assert_eq!(updated.message.as_deref(), Some("Product not found"));
    }

    #[tokio::test]
    async fn test_document_round_trip() {
        let collection = Arc::new(MemoryCollection::new("orders"));
        let repo = Repository::<Orders>::new(&ModelHandle::document(collection.clone()), online());
        let created = repo
            .create(record(json!({"orderNumber": "A-100", "status": "pending", "totalAmount": 12.5})))
            .await
            .into_data()
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let stored = collection.documents().await;
        assert!(stored[0].get_datetime("createdAt").is_ok());

        let fetched = repo.get_by_id(&id).await;
        assert!(fetched.success);
        assert_eq!(fetched.data().unwrap()["orderNumber"], json!("A-100"));

        let listed = repo
            .get_all(&FilterDescription::new().eq("status", "pending"), PageRequest::default())
            .await
            .into_data()
            .unwrap();
        assert_eq!(listed.pagination.total, 1);

        assert_eq!(repo.delete(&id).await.data(), Some(&true));
        let missing = repo.get_by_id(&id).await;
        assert!(!missing.success);
        assert!(missing.data.is_none());
    }

    #[tokio::test]
    async fn test_backend_error_becomes_failure_envelope() {
        let table = user_table();
        let repo = Repository::<Users>::new(&ModelHandle::relational(table.clone()), online());
        table.set_failing(true);
        let envelope = repo.get_all(&FilterDescription::new(), PageRequest::default()).await;
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_deref(), Some("table users is unreachable"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure_envelope() {
        let table = user_table();
        table.set_latency(Duration::from_millis(200));
        let settings = RepositoryConfig {
            query_timeout_ms: 20,
            ..RepositoryConfig::default()
        };
        let repo = Repository::<Users>::new(&ModelHandle::relational(table), online())
            .with_settings(settings);
        let envelope = repo.get_by_id("1").await;
        assert!(!envelope.success);
        assert!(envelope.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_calls_fail() {
        let token = CancellationToken::new();
        let repo = Repository::<Users>::new(&ModelHandle::relational(user_table()), online())
            .with_cancellation(token.clone());
        token.cancel();
        let envelope = repo.get_by_id("1").await;
        assert!(!envelope.success);
        assert!(envelope.is_error());
    }

    #[tokio::test]
    async fn test_find_one_by_email() {
        let table = user_table();
        table
            .seed([
                record(json!({"name": "Ada", "email": "ada@example.com", "password": "h"})),
                record(json!({"name": "Bob", "email": "bob@example.com"})),
            ])
            .await;
        let repo = Repository::<Users>::new(&ModelHandle::relational(table), online());
        let found = repo
            .find_one(&FilterDescription::new().eq("email", "ada@example.com"))
            .await;
        let user = found.into_data().unwrap();
        assert_eq!(user["name"], json!("Ada"));
        assert!(!user.contains_key("password"));
    }

    #[test]
    fn test_strip_protected() {
        let stripped = strip_protected(record(json!({
            "id": 1, "_id": "x", "createdAt": "now", "password": "p", "passwordHash": "h", "name": "n"
        })));
        assert_eq!(stripped.keys().collect::<Vec<_>>(), vec!["name"]);
    }
}
