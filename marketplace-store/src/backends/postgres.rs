//! PostgreSQL table backend
//!
//! Rows travel as JSON in both directions: reads select `row_to_json(t)` and
//! writes go through `jsonb_populate_record`, so one code path serves every
//! table whatever its column types. Identifiers are quoted and every value is
//! a bound parameter.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::database::load_columns;
use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
use crate::repository::{
    FilterValue, OrderBy, OrderDirection, Pagination, Record, RelationalStore,
};
use crate::translate::{ColumnSet, SqlOperator, SqlPredicate, SqlWhere};

/// One table behind a shared pool
#[derive(Debug, Clone)]
pub struct PgTable {
    pool: PgPool,
    table: String,
    columns: ColumnSet,
}

impl PgTable {
    /// Bind to `table`, loading its column allow-list
    pub async fn connect(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let columns = load_columns(&pool, &table).await?;
        Ok(Self::with_columns(pool, table, columns))
    }

    /// Bind to `table` with a known allow-list
    pub fn with_columns(pool: PgPool, table: impl Into<String>, columns: ColumnSet) -> Self {
        Self {
            pool,
            table: table.into(),
            columns,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn failed(&self, operation: DatabaseOperation) -> impl FnOnce(sqlx::Error) -> Error + '_ {
        move |e| Error::Database(DatabaseError::from(e).during(operation).add_context(self.table.clone()))
    }
}

#[async_trait]
impl RelationalStore for PgTable {
    fn table(&self) -> &str {
        &self.table
    }

    fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    async fn select(
        &self,
        filter: &SqlWhere,
        order: OrderBy<'_>,
        window: Pagination,
    ) -> Result<Vec<Record>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS record FROM ");
        builder.push(quote_ident(&self.table)).push(" AS t");
        push_where(&mut builder, filter);
        if let Some((column, direction)) = order {
            builder
                .push(" ORDER BY ")
                .push(quote_ident(column))
                .push(match direction {
                    OrderDirection::Ascending => " ASC",
                    OrderDirection::Descending => " DESC NULLS LAST",
                });
        }
        builder
            .push(" LIMIT ")
            .push_bind(to_i64(window.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(window.offset));

        let rows: Vec<Value> = builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(self.failed(DatabaseOperation::Query))?;
        Ok(rows.into_iter().filter_map(into_record).collect())
    }

    async fn count(&self, filter: &SqlWhere) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
        builder.push(quote_ident(&self.table));
        push_where(&mut builder, filter);
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(self.failed(DatabaseOperation::Aggregate))?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn sum(&self, column: &str, filter: &SqlWhere) -> Result<f64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COALESCE(SUM(");
        builder
            .push(quote_ident(column))
            .push("), 0)::float8 FROM ")
            .push(quote_ident(&self.table));
        push_where(&mut builder, filter);
        builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(self.failed(DatabaseOperation::Aggregate))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) FROM ");
        builder
            .push(quote_ident(&self.table))
            .push(" AS t WHERE t.\"id\"::text = ")
            .push_bind(id.to_string());
        let row: Option<Value> = builder
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await
            .map_err(self.failed(DatabaseOperation::Query))?;
        Ok(row.and_then(into_record))
    }

    async fn insert(&self, mut values: Record) -> Result<Record> {
        values.retain(|column, _| self.columns.contains(column));
        let table = quote_ident(&self.table);
        let mut builder = QueryBuilder::<Postgres>::new("INSERT INTO ");
        builder.push(&table).push(" AS t ");
        if values.is_empty() {
            builder.push("DEFAULT VALUES");
        } else {
            let columns = column_list(&values);
            builder
                .push("(")
                .push(&columns)
                .push(") SELECT ")
                .push(&columns)
                .push(" FROM jsonb_populate_record(NULL::")
                .push(&table)
                .push(", ")
                .push_bind(Value::Object(values))
                .push(")");
        }
        builder.push(" RETURNING row_to_json(t)");

        let row: Value = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(self.failed(DatabaseOperation::Insert))?;
        into_record(row).ok_or_else(|| {
            Error::Database(DatabaseError::new(
                DatabaseOperation::Insert,
                DatabaseErrorKind::TypeConversion,
                "inserted row is not a JSON object",
            ))
        })
    }

    async fn update(&self, id: &str, mut values: Record) -> Result<Option<Record>> {
        values.retain(|column, _| self.columns.contains(column) && column != "id");
        if values.is_empty() {
            return self.find_by_id(id).await;
        }
        let table = quote_ident(&self.table);
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE ");
        builder.push(&table).push(" AS t SET ");
        for (i, column) in values.keys().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            let column = quote_ident(column);
            builder.push(&column).push(" = src.").push(&column);
        }
        builder
            .push(" FROM jsonb_populate_record(NULL::")
            .push(&table)
            .push(", ")
            .push_bind(Value::Object(values))
            .push(") AS src WHERE t.\"id\"::text = ")
            .push_bind(id.to_string())
            .push(" RETURNING row_to_json(t)");

        let row: Option<Value> = builder
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await
            .map_err(self.failed(DatabaseOperation::Update))?;
        Ok(row.and_then(into_record))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM ");
        builder
            .push(quote_ident(&self.table))
            .push(" WHERE \"id\"::text = ")
            .push_bind(id.to_string());
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(self.failed(DatabaseOperation::Delete))?;
        Ok(result.rows_affected() > 0)
    }
}

/// Double-quote an identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Append ` WHERE ...` unless the clause is empty
pub fn push_where(builder: &mut QueryBuilder<'_, Postgres>, clause: &SqlWhere) {
    if clause.is_empty() {
        return;
    }
    builder.push(" WHERE ");
    push_conjunction(builder, clause);
}

fn push_conjunction(builder: &mut QueryBuilder<'_, Postgres>, clause: &SqlWhere) {
    if clause.is_empty() {
        builder.push("TRUE");
        return;
    }
    for (i, predicate) in clause.predicates().iter().enumerate() {
        if i > 0 {
            builder.push(" AND ");
        }
        push_predicate(builder, predicate);
    }
}

fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &SqlPredicate) {
    match predicate {
        SqlPredicate::Compare { column, op, value } => {
            if matches!(value, FilterValue::Null) {
                match op {
                    SqlOperator::Equal => builder.push(quote_ident(column)).push(" IS NULL"),
                    SqlOperator::NotEqual => builder.push(quote_ident(column)).push(" IS NOT NULL"),
                    // ordering against NULL is never true
                    _ => builder.push("FALSE"),
                };
                return;
            }
            let textual = matches!(value, FilterValue::String(_))
                && matches!(op, SqlOperator::Equal | SqlOperator::NotEqual);
            push_column(builder, column, textual);
            builder.push(" ").push(op.as_sql()).push(" ");
            push_value(builder, value);
        }
        SqlPredicate::In { column, values } => {
            if values.is_empty() {
                builder.push("FALSE");
                return;
            }
            let textual = values.iter().all(|v| matches!(v, FilterValue::String(_)));
            push_column(builder, column, textual);
            builder.push(" IN (");
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_value(builder, value);
            }
            builder.push(")");
        }
        SqlPredicate::ILike { column, pattern } => {
            push_column(builder, column, true);
            builder.push(" ILIKE ").push_bind(pattern.clone());
        }
        SqlPredicate::Any(branches) => {
            if branches.is_empty() {
                builder.push("FALSE");
                return;
            }
            builder.push("(");
            for (i, branch) in branches.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder.push("(");
                push_conjunction(builder, branch);
                builder.push(")");
            }
            builder.push(")");
        }
    }
}

/// String equality compares against the column's text form so ids and enums
/// stored as numbers still match. Range operators never cast: text order would
/// let `9` pass `>= '10'`.
fn push_column(builder: &mut QueryBuilder<'_, Postgres>, column: &str, as_text: bool) {
    builder.push(quote_ident(column));
    if as_text {
        builder.push("::text");
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Null => {
            builder.push("NULL");
        }
        FilterValue::Boolean(v) => {
            builder.push_bind(*v);
        }
        FilterValue::Integer(v) => {
            builder.push_bind(*v);
        }
        FilterValue::Float(v) => {
            builder.push_bind(*v);
        }
        FilterValue::String(v) => {
            builder.push_bind(v.clone());
        }
        FilterValue::Timestamp(v) => {
            builder.push_bind(*v);
        }
        FilterValue::List(items) => {
            builder.push_bind(FilterValue::List(items.clone()).to_json());
        }
    }
}

fn column_list(values: &Record) -> String {
    values
        .keys()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn into_record(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FilterDescription;
    use crate::translate::{normalize, to_sql_where, DEFAULT_DATE_FIELDS};
    use serde_json::json;

    fn render(clause: &SqlWhere) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM \"t\"");
        push_where(&mut builder, clause);
        builder.sql().to_string()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("createdAt"), "\"createdAt\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_empty_clause_has_no_where() {
        assert_eq!(render(&SqlWhere::default()), "SELECT 1 FROM \"t\"");
    }

    #[test]
    fn test_compare_and_in() {
        let clause = SqlWhere::new(vec![
            SqlPredicate::Compare {
                column: "price".into(),
                op: SqlOperator::GreaterThanOrEqual,
                value: 10_i64.into(),
            },
            SqlPredicate::In {
                column: "status".into(),
                values: vec!["paid".into(), "shipped".into()],
            },
        ]);
        assert_eq!(
            render(&clause),
            "SELECT 1 FROM \"t\" WHERE \"price\" >= $1 AND \"status\"::text IN ($2, $3)"
        );
    }

    #[test]
    fn test_range_bounds_never_cast_to_text() {
        let filter = normalize(
            &FilterDescription::from_json(&json!({"price": {"gte": "10"}})),
            DEFAULT_DATE_FIELDS,
        );
        let clause = to_sql_where(&filter, &ColumnSet::new(["price"]));
        assert_eq!(render(&clause), "SELECT 1 FROM \"t\" WHERE \"price\" >= $1");

        let clause = SqlWhere::new(vec![
            SqlPredicate::Compare {
                column: "name".into(),
                op: SqlOperator::LessThan,
                value: "m".into(),
            },
            SqlPredicate::Compare {
                column: "id".into(),
                op: SqlOperator::Equal,
                value: "42".into(),
            },
        ]);
        assert_eq!(
            render(&clause),
            "SELECT 1 FROM \"t\" WHERE \"name\" < $1 AND \"id\"::text = $2"
        );
    }

    #[test]
    fn test_null_and_empty_lists() {
        let clause = SqlWhere::new(vec![
            SqlPredicate::Compare {
                column: "deletedAt".into(),
                op: SqlOperator::Equal,
                value: FilterValue::Null,
            },
            SqlPredicate::In {
                column: "id".into(),
                values: vec![],
            },
        ]);
        assert_eq!(
            render(&clause),
            "SELECT 1 FROM \"t\" WHERE \"deletedAt\" IS NULL AND FALSE"
        );
    }

    #[test]
    fn test_any_and_ilike() {
        let clause = SqlWhere::new(vec![
            SqlPredicate::Any(vec![
                SqlWhere::new(vec![SqlPredicate::ILike {
                    column: "name".into(),
                    pattern: "%boot%".into(),
                }]),
                SqlWhere::new(vec![SqlPredicate::ILike {
                    column: "description".into(),
                    pattern: "%boot%".into(),
                }]),
            ]),
            SqlPredicate::Any(vec![]),
        ]);
        assert_eq!(
            render(&clause),
            "SELECT 1 FROM \"t\" WHERE ((\"name\"::text ILIKE $1) OR (\"description\"::text ILIKE $2)) AND FALSE"
        );
    }
}
