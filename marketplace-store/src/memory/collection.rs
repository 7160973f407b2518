//! In-memory document collection

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use regex::RegexBuilder;
use tokio::sync::RwLock;

use crate::error::{DatabaseError, DatabaseOperation, Error, Result};
use crate::repository::{DocumentStore, Pagination, Record};
use crate::translate::codec::{document_to_record, id_filter};

/// A collection held in process memory
///
/// Evaluates the filter subset the translator emits: literal equality,
/// `$gte`/`$gt`/`$lte`/`$lt`/`$ne`/`$in`, `$regex` with `$options`, and
/// top-level `$or`/`$and`. Missing fields equal `null`, as in MongoDB.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
    ready: AtomicBool,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            ready: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, AtomicOrdering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, AtomicOrdering::SeqCst);
    }

    /// Insert documents directly, assigning `_id` where missing
    pub async fn seed(&self, documents: impl IntoIterator<Item = Document>) {
        let mut stored = self.documents.write().await;
        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            stored.push(document);
        }
    }

    /// Copy of every stored document
    pub async fn documents(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    async fn gate(&self, operation: DatabaseOperation) -> Result<()> {
        let latency = self.latency_ms.load(AtomicOrdering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(Error::Document(
                DatabaseError::connection_failed(format!(
                    "collection {} is unreachable",
                    self.name
                ))
                .during(operation),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryCollection {
    fn collection(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(AtomicOrdering::SeqCst)
    }

    async fn find(&self, filter: Document, sort: Document, window: Pagination) -> Result<Vec<Record>> {
        self.gate(DatabaseOperation::Query).await?;
        let documents = self.documents.read().await;
        let mut matching: Vec<&Document> = documents
            .iter()
            .filter(|document| matches_filter(&filter, document))
            .collect();
        if let Some((field, direction)) = sort.iter().next() {
            let descending = match direction {
                Bson::Int32(d) => *d < 0,
                Bson::Int64(d) => *d < 0,
                _ => false,
            };
            matching.sort_by(|a, b| {
                let ordering = order_values(a.get(field), b.get(field));
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        Ok(matching
            .into_iter()
            .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
            .cloned()
            .map(document_to_record)
            .collect())
    }

    async fn count_documents(&self, filter: Document) -> Result<u64> {
        self.gate(DatabaseOperation::Aggregate).await?;
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|document| matches_filter(&filter, document))
            .count() as u64)
    }

    async fn sum(&self, field: &str, filter: Document) -> Result<f64> {
        self.gate(DatabaseOperation::Aggregate).await?;
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|document| matches_filter(&filter, document))
            .filter_map(|document| numeric(document.get(field)?))
            .sum())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        self.gate(DatabaseOperation::Query).await?;
        let filter = id_filter(id);
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .find(|document| matches_filter(&filter, document))
            .cloned()
            .map(document_to_record))
    }

    async fn insert_one(&self, mut document: Document) -> Result<Record> {
        self.gate(DatabaseOperation::Insert).await?;
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        self.documents.write().await.push(document.clone());
        Ok(document_to_record(document))
    }

    async fn update_by_id(&self, id: &str, changes: Document) -> Result<Option<Record>> {
        self.gate(DatabaseOperation::Update).await?;
        let filter = id_filter(id);
        let mut documents = self.documents.write().await;
        let Some(document) = documents
            .iter_mut()
            .find(|document| matches_filter(&filter, document))
        else {
            return Ok(None);
        };
        document.extend(changes);
        Ok(Some(document_to_record(document.clone())))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        self.gate(DatabaseOperation::Delete).await?;
        let filter = id_filter(id);
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|document| !matches_filter(&filter, document));
        Ok(documents.len() != before)
    }
}

/// Evaluate a filter document against one document
pub fn matches_filter(filter: &Document, document: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$or" => condition.as_array().is_some_and(|alternatives| {
            alternatives
                .iter()
                .any(|alt| alt.as_document().is_some_and(|alt| matches_filter(alt, document)))
        }),
        "$and" => condition.as_array().is_some_and(|clauses| {
            clauses
                .iter()
                .all(|clause| clause.as_document().is_some_and(|clause| matches_filter(clause, document)))
        }),
        field if field.starts_with('$') => false,
        field => field_matches(document.get(field), condition),
    })
}

fn field_matches(actual: Option<&Bson>, condition: &Bson) -> bool {
    let operators = match condition {
        Bson::Document(ops) if ops.keys().next().is_some_and(|k| k.starts_with('$')) => ops,
        literal => return equals(actual, literal),
    };
    let case_insensitive = operators
        .get_str("$options")
        .map(|options| options.contains('i'))
        .unwrap_or(false);
    operators.iter().all(|(op, operand)| match op.as_str() {
        "$gte" => compare_option(actual, operand).is_some_and(|o| o != Ordering::Less),
        "$gt" => compare_option(actual, operand) == Some(Ordering::Greater),
        "$lte" => compare_option(actual, operand).is_some_and(|o| o != Ordering::Greater),
        "$lt" => compare_option(actual, operand) == Some(Ordering::Less),
        "$ne" => !equals(actual, operand),
        "$in" => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| equals(actual, item))),
        "$regex" => match (actual, operand.as_str()) {
            (Some(Bson::String(text)), Some(pattern)) => RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .is_ok_and(|re| re.is_match(text)),
            _ => false,
        },
        "$options" => true,
        "$exists" => operand.as_bool() == Some(actual.is_some()),
        _ => false,
    })
}

fn equals(actual: Option<&Bson>, expected: &Bson) -> bool {
    match actual {
        None | Some(Bson::Null) => matches!(expected, Bson::Null),
        Some(actual) => compare(actual, expected) == Some(Ordering::Equal),
    }
}

fn compare_option(actual: Option<&Bson>, expected: &Bson) -> Option<Ordering> {
    compare(actual?, expected)
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            Some(x.timestamp_millis().cmp(&y.timestamp_millis()))
        }
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        (x, y) => numeric(x)?.partial_cmp(&numeric(y)?),
    }
}

fn order_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None | Some(Bson::Null), None | Some(Bson::Null)) => Ordering::Equal,
        (None | Some(Bson::Null), _) => Ordering::Less,
        (_, None | Some(Bson::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}
