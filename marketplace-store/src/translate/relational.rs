//! Relational target: where-clause trees over allow-listed columns
//!
//! [`to_sql_where`] turns a normalized [`FilterDescription`] into an
//! [`SqlWhere`], a conjunction of [`SqlPredicate`]s. Fields missing from the
//! table's [`ColumnSet`] never reach the output. Rendering to SQL text with
//! bound parameters is the job of the backend.

use std::collections::BTreeSet;
use std::fmt;

use crate::repository::{Constraint, FilterDescription, FilterOperator, FilterValue, Operand};

/// Column names a table is known to have
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet(BTreeSet<String>);

impl ColumnSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl SqlOperator {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
        }
    }

    /// Comparison counterpart of a filter operator; `in` and `or` have none
    pub const fn from_filter(operator: FilterOperator) -> Option<Self> {
        match operator {
            FilterOperator::GreaterThanOrEqual => Some(Self::GreaterThanOrEqual),
            FilterOperator::LessThanOrEqual => Some(Self::LessThanOrEqual),
            FilterOperator::GreaterThan => Some(Self::GreaterThan),
            FilterOperator::LessThan => Some(Self::LessThan),
            FilterOperator::NotEqual => Some(Self::NotEqual),
            FilterOperator::In | FilterOperator::Or => None,
        }
    }
}

impl fmt::Display for SqlOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One condition of a where-clause
#[derive(Debug, Clone, PartialEq)]
pub enum SqlPredicate {
    Compare {
        column: String,
        op: SqlOperator,
        value: FilterValue,
    },
    In {
        column: String,
        values: Vec<FilterValue>,
    },
    /// Case-insensitive `LIKE`; the pattern is already escaped
    ILike { column: String, pattern: String },
    /// Disjunction of conjunctions. No branches means false.
    Any(Vec<SqlWhere>),
}

/// Conjunction of predicates. No predicates means true.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlWhere {
    predicates: Vec<SqlPredicate>,
}

impl SqlWhere {
    pub fn new(predicates: Vec<SqlPredicate>) -> Self {
        Self { predicates }
    }

    pub fn push(&mut self, predicate: SqlPredicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[SqlPredicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

/// Translate a normalized filter for a table with the given columns
pub fn to_sql_where(filter: &FilterDescription, columns: &ColumnSet) -> SqlWhere {
    let mut clause = SqlWhere::default();
    for (field, constraint) in filter.iter() {
        if !columns.contains(field) {
            tracing::debug!(field, "dropping filter on column outside the allow-list");
            continue;
        }
        push_constraint(field, constraint, &mut clause);
    }
    clause
}

fn push_constraint(column: &str, constraint: &Constraint, out: &mut SqlWhere) {
    match constraint {
        Constraint::Equals(FilterValue::List(values)) => out.push(SqlPredicate::In {
            column: column.to_string(),
            values: values.clone(),
        }),
        Constraint::Equals(value) => out.push(SqlPredicate::Compare {
            column: column.to_string(),
            op: SqlOperator::Equal,
            value: value.clone(),
        }),
        Constraint::Compare(comparisons) => {
            for comparison in comparisons {
                match (comparison.operator, &comparison.operand) {
                    (FilterOperator::Or, Operand::AnyOf(alternatives)) => {
                        let branches = alternatives
                            .iter()
                            .map(|alt| {
                                let mut branch = SqlWhere::default();
                                push_constraint(column, alt, &mut branch);
                                branch
                            })
                            .collect();
                        out.push(SqlPredicate::Any(branches));
                    }
                    (FilterOperator::In, Operand::Value(FilterValue::List(values))) => {
                        out.push(SqlPredicate::In {
                            column: column.to_string(),
                            values: values.clone(),
                        })
                    }
                    (FilterOperator::In, Operand::Value(value)) => out.push(SqlPredicate::In {
                        column: column.to_string(),
                        values: vec![value.clone()],
                    }),
                    (operator, Operand::Value(value)) => {
                        if let Some(op) = SqlOperator::from_filter(operator) {
                            out.push(SqlPredicate::Compare {
                                column: column.to_string(),
                                op,
                                value: value.clone(),
                            });
                        }
                    }
                    (operator, Operand::AnyOf(_)) => {
                        tracing::debug!(column, %operator, "ignoring alternatives on non-or operator");
                    }
                }
            }
        }
    }
}

/// Case-insensitive substring match of `term` over the searchable columns
///
/// Columns the table lacks are skipped; if none remain the predicate matches
/// nothing.
pub fn text_search(term: &str, fields: &[&str], columns: &ColumnSet) -> SqlPredicate {
    let pattern = format!("%{}%", escape_like(term));
    let branches = fields
        .iter()
        .filter(|field| columns.contains(field))
        .map(|field| {
            SqlWhere::new(vec![SqlPredicate::ILike {
                column: (*field).to_string(),
                pattern: pattern.clone(),
            }])
        })
        .collect();
    SqlPredicate::Any(branches)
}

/// Escape `LIKE` wildcards with the default backslash escape
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
