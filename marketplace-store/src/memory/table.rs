//! In-memory relational table

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{DatabaseError, DatabaseOperation, Error, Result};
use crate::repository::{
    FilterValue, OrderBy, OrderDirection, Pagination, Record, RelationalStore,
};
use crate::translate::normalize::parse_date_str;
use crate::translate::{ColumnSet, SqlOperator, SqlPredicate, SqlWhere};

/// A table held in process memory
///
/// Behaves like a PostgreSQL table for the subset the repositories use:
/// unknown columns are dropped on write, missing columns read back as `null`,
/// ids are assigned from a sequence and comparisons against `NULL` never
/// match.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    columns: ColumnSet,
    rows: RwLock<Vec<Record>>,
    next_id: AtomicU64,
    ready: AtomicBool,
    failing: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryTable {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: ColumnSet::new(columns),
            rows: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            ready: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Report the handle as (not) ready
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, AtomicOrdering::SeqCst);
    }

    /// Make every call fail with a connection error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, AtomicOrdering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, AtomicOrdering::SeqCst);
    }

    /// Insert rows directly, bypassing failure injection
    pub async fn seed(&self, rows: impl IntoIterator<Item = Record>) {
        let shaped: Vec<Record> = rows.into_iter().map(|row| self.shape(row)).collect();
        self.rows.write().await.extend(shaped);
    }

    /// Copy of every stored row
    pub async fn rows(&self) -> Vec<Record> {
        self.rows.read().await.clone()
    }

    async fn gate(&self, operation: DatabaseOperation) -> Result<()> {
        let latency = self.latency_ms.load(AtomicOrdering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.failing.load(AtomicOrdering::SeqCst) {
            return Err(Error::Database(
                DatabaseError::connection_failed(format!("table {} is unreachable", self.name))
                    .during(operation),
            ));
        }
        Ok(())
    }

    fn shape(&self, mut row: Record) -> Record {
        row.retain(|column, _| self.columns.contains(column));
        if self.columns.contains("id") {
            match row.get("id") {
                None | Some(Value::Null) => {
                    let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
                    row.insert("id".to_string(), Value::from(id));
                }
                Some(Value::Number(n)) => {
                    if let Some(n) = n.as_u64() {
                        self.next_id.fetch_max(n + 1, AtomicOrdering::SeqCst);
                    }
                }
                Some(_) => {}
            }
        }
        for column in self.columns.iter() {
            if !row.contains_key(column) {
                row.insert(column.to_string(), Value::Null);
            }
        }
        row
    }
}

#[async_trait]
impl RelationalStore for MemoryTable {
    fn table(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    fn is_ready(&self) -> bool {
        self.ready.load(AtomicOrdering::SeqCst)
    }

    async fn select(
        &self,
        filter: &SqlWhere,
        order: OrderBy<'_>,
        window: Pagination,
    ) -> Result<Vec<Record>> {
        self.gate(DatabaseOperation::Query).await?;
        let rows = self.rows.read().await;
        let mut matching: Vec<&Record> = rows.iter().filter(|row| matches(filter, row)).collect();
        if let Some((column, direction)) = order {
            matching.sort_by(|a, b| {
                let ordering = order_values(a.get(column), b.get(column));
                match direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }
        Ok(matching
            .into_iter()
            .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
            .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &SqlWhere) -> Result<u64> {
        self.gate(DatabaseOperation::Aggregate).await?;
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|row| matches(filter, row)).count() as u64)
    }

    async fn sum(&self, column: &str, filter: &SqlWhere) -> Result<f64> {
        self.gate(DatabaseOperation::Aggregate).await?;
        if !self.columns.contains(column) {
            return Err(Error::Database(
                DatabaseError::query_failed(
                    DatabaseOperation::Aggregate,
                    format!("column \"{column}\" does not exist"),
                )
                .add_context(self.name.clone()),
            ));
        }
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|row| matches(filter, row))
            .filter_map(|row| numeric(row.get(column)?))
            .sum())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        self.gate(DatabaseOperation::Query).await?;
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|row| id_matches(row, id)).cloned())
    }

    async fn insert(&self, values: Record) -> Result<Record> {
        self.gate(DatabaseOperation::Insert).await?;
        let row = self.shape(values);
        self.rows.write().await.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: &str, values: Record) -> Result<Option<Record>> {
        self.gate(DatabaseOperation::Update).await?;
        let mut rows = self.rows.write().await;
        let Some(row) = rows.iter_mut().find(|row| id_matches(row, id)) else {
            return Ok(None);
        };
        for (column, value) in values {
            if self.columns.contains(&column) {
                row.insert(column, value);
            }
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        self.gate(DatabaseOperation::Delete).await?;
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| !id_matches(row, id));
        Ok(rows.len() != before)
    }
}

/// Evaluate a where-clause against one row
pub fn matches(clause: &SqlWhere, row: &Record) -> bool {
    clause
        .predicates()
        .iter()
        .all(|predicate| predicate_holds(predicate, row))
}

fn predicate_holds(predicate: &SqlPredicate, row: &Record) -> bool {
    match predicate {
        SqlPredicate::Compare { column, op, value } => {
            let actual = row.get(column).unwrap_or(&Value::Null);
            if matches!(value, FilterValue::Null) {
                return match op {
                    SqlOperator::Equal => actual.is_null(),
                    SqlOperator::NotEqual => !actual.is_null(),
                    _ => false,
                };
            }
            if matches!(op, SqlOperator::Equal | SqlOperator::NotEqual) {
                return equality(actual, value).is_some_and(|ordering| operator_holds(*op, ordering));
            }
            compare(actual, value).is_some_and(|ordering| operator_holds(*op, ordering))
        }
        SqlPredicate::In { column, values } => {
            let actual = row.get(column).unwrap_or(&Value::Null);
            values
                .iter()
                .any(|value| equality(actual, value) == Some(Ordering::Equal))
        }
        SqlPredicate::ILike { column, pattern } => match row.get(column) {
            Some(Value::String(text)) => like_regex(pattern).is_some_and(|re| re.is_match(text)),
            _ => false,
        },
        SqlPredicate::Any(branches) => branches.iter().any(|branch| matches(branch, row)),
    }
}

fn operator_holds(op: SqlOperator, ordering: Ordering) -> bool {
    match op {
        SqlOperator::Equal => ordering == Ordering::Equal,
        SqlOperator::NotEqual => ordering != Ordering::Equal,
        SqlOperator::GreaterThan => ordering == Ordering::Greater,
        SqlOperator::GreaterThanOrEqual => ordering != Ordering::Less,
        SqlOperator::LessThan => ordering == Ordering::Less,
        SqlOperator::LessThanOrEqual => ordering != Ordering::Greater,
    }
}

/// `=`, `<>` and `IN` match a string operand against the text form of a
/// number, like the `::text` cast the SQL renderer emits
fn equality(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), FilterValue::String(b)) => Some(a.to_string().as_str().cmp(b.as_str())),
        _ => compare(actual, expected),
    }
}

/// A string never orders against a number
fn compare(actual: &Value, expected: &FilterValue) -> Option<Ordering> {
    match (actual, expected) {
        (Value::Number(a), FilterValue::Integer(b)) => a.as_f64()?.partial_cmp(&(*b as f64)),
        (Value::Number(a), FilterValue::Float(b)) => a.as_f64()?.partial_cmp(b),
        (Value::Number(a), FilterValue::Timestamp(b)) => {
            Some(a.as_i64()?.cmp(&b.timestamp_millis()))
        }
        (Value::String(a), FilterValue::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::String(a), FilterValue::Timestamp(b)) => Some(parse_date_str(a)?.cmp(b)),
        (Value::Bool(a), FilterValue::Boolean(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (parse_date_str(x), parse_date_str(y)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        // nulls sort first ascending, last descending
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn id_matches(row: &Record, id: &str) -> bool {
    match row.get("id") {
        Some(Value::String(s)) => s == id,
        Some(Value::Number(n)) => n.to_string() == id,
        _ => false,
    }
}

/// Compile an escaped `LIKE` pattern to a case-insensitive regex
fn like_regex(pattern: &str) -> Option<Regex> {
    let mut source = String::from("(?is)^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    source.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).ok()
}
