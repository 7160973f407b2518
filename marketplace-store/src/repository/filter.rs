//! Backend-agnostic filter descriptions
//!
//! A [`FilterDescription`] maps field names to a [`Constraint`]: either a
//! literal equality or a set of operator comparisons. Callers usually build one
//! from request JSON with [`FilterDescription::from_json`], which accepts both
//! bare (`gte`) and `$`-prefixed (`$gte`) operator names.
//!
//! # Example
//!
//! ```rust
//! use marketplace_store::repository::{Constraint, FilterDescription, FilterOperator};
//! use serde_json::json;
//!
//! let filter = FilterDescription::from_json(&json!({
//!     "status": "pending",
//!     "createdAt": { "$gte": "2024-01-01", "lt": "2024-02-01" },
//!     "total": { "between": [1, 2] }, // unknown operator, dropped
//! }));
//!
//! assert!(matches!(filter.get("status"), Some(Constraint::Equals(_))));
//! match filter.get("createdAt") {
//!     Some(Constraint::Compare(comparisons)) => assert_eq!(comparisons.len(), 2),
//!     other => panic!("unexpected constraint: {other:?}"),
//! }
//! assert!(matches!(filter.get("total"), Some(Constraint::Compare(c)) if c.is_empty()));
//! assert_eq!(FilterOperator::parse("$in"), Some(FilterOperator::In));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Comparison operators understood by both dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    /// Greater than or equal (`gte`)
    GreaterThanOrEqual,
    /// Less than or equal (`lte`)
    LessThanOrEqual,
    /// Greater than (`gt`)
    GreaterThan,
    /// Less than (`lt`)
    LessThan,
    /// Not equal (`ne`)
    NotEqual,
    /// Member of a list (`in`)
    In,
    /// Any of several alternatives for the same field (`or`)
    Or,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 7] = [
        FilterOperator::GreaterThanOrEqual,
        FilterOperator::LessThanOrEqual,
        FilterOperator::GreaterThan,
        FilterOperator::LessThan,
        FilterOperator::NotEqual,
        FilterOperator::In,
        FilterOperator::Or,
    ];

    /// Parse an operator name with or without the leading `$`
    pub fn parse(name: &str) -> Option<Self> {
        match name.strip_prefix('$').unwrap_or(name) {
            "gte" => Some(Self::GreaterThanOrEqual),
            "lte" => Some(Self::LessThanOrEqual),
            "gt" => Some(Self::GreaterThan),
            "lt" => Some(Self::LessThan),
            "ne" => Some(Self::NotEqual),
            "in" => Some(Self::In),
            "or" => Some(Self::Or),
            _ => None,
        }
    }

    /// `gte`, `lte`, `gt` and `lt`
    pub const fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::GreaterThanOrEqual | Self::LessThanOrEqual | Self::GreaterThan | Self::LessThan
        )
    }

    /// Bare operator name (`gte`, `in`, ...)
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GreaterThanOrEqual => "gte",
            Self::LessThanOrEqual => "lte",
            Self::GreaterThan => "gt",
            Self::LessThan => "lt",
            Self::NotEqual => "ne",
            Self::In => "in",
            Self::Or => "or",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed literal used in filter constraints
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    /// Values for `in` comparisons
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// Convert a JSON scalar or array; objects have no literal form
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Boolean(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => Some(Self::List(
                items.iter().filter_map(Self::from_json).collect(),
            )),
            Value::Object(_) => None,
        }
    }

    /// `true` for null and the empty string, the values a caller sends for
    /// "not specified"
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(n) => Value::from(*n),
            Self::Float(n) => Value::from(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            }
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(FilterValue),
    /// Alternatives for an `or` comparison
    AnyOf(Vec<Constraint>),
}

/// A single `{op: value}` entry of an operator object
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub operator: FilterOperator,
    pub operand: Operand,
}

impl Comparison {
    pub fn new(operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        Self {
            operator,
            operand: Operand::Value(value.into()),
        }
    }

    pub fn any_of(alternatives: Vec<Constraint>) -> Self {
        Self {
            operator: FilterOperator::Or,
            operand: Operand::AnyOf(alternatives),
        }
    }

    fn from_json(operator: FilterOperator, value: &Value) -> Option<Self> {
        let operand = match (operator, value) {
            (FilterOperator::Or, Value::Array(items)) => {
                Operand::AnyOf(items.iter().filter_map(Constraint::from_json).collect())
            }
            (FilterOperator::Or, single) => {
                Operand::AnyOf(Constraint::from_json(single).into_iter().collect())
            }
            (FilterOperator::In, Value::Array(_)) => Operand::Value(FilterValue::from_json(value)?),
            (FilterOperator::In, scalar) => {
                Operand::Value(FilterValue::List(vec![FilterValue::from_json(scalar)?]))
            }
            (_, other) => Operand::Value(FilterValue::from_json(other)?),
        };
        Some(Self { operator, operand })
    }
}

/// What a single field must satisfy
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Literal equality
    Equals(FilterValue),
    /// Every comparison must hold
    Compare(Vec<Comparison>),
}

impl Constraint {
    /// Parse a JSON constraint
    ///
    /// Objects become operator sets (unknown operator names are dropped),
    /// arrays become `in` lists, and scalars become equality.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => {
                let comparisons = map
                    .iter()
                    .filter_map(|(name, operand)| match FilterOperator::parse(name) {
                        Some(operator) => Comparison::from_json(operator, operand),
                        None => {
                            tracing::debug!(operator = %name, "dropping unsupported filter operator");
                            None
                        }
                    })
                    .collect();
                Some(Self::Compare(comparisons))
            }
            Value::Array(_) => Some(Self::Compare(vec![Comparison {
                operator: FilterOperator::In,
                operand: Operand::Value(FilterValue::from_json(value)?),
            }])),
            scalar => FilterValue::from_json(scalar).map(Self::Equals),
        }
    }
}

/// Caller filter key holding a free-text search term
pub const SEARCH_KEY: &str = "search";

/// Field name to constraint map handed to repositories and aggregates
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterDescription {
    clauses: BTreeMap<String, Constraint>,
}

impl FilterDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; anything else yields an empty filter
    pub fn from_json(value: &Value) -> Self {
        let clauses = match value {
            Value::Object(map) => map
                .iter()
                .filter_map(|(field, constraint)| {
                    Constraint::from_json(constraint).map(|c| (field.clone(), c))
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        Self { clauses }
    }

    /// Add an equality constraint
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.clauses
            .insert(field.into(), Constraint::Equals(value.into()));
        self
    }

    /// Add a comparison, merging with comparisons already present on the field
    #[must_use]
    pub fn compare(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        let comparison = Comparison::new(operator, value);
        let field = field.into();
        match self.clauses.get_mut(&field) {
            Some(Constraint::Compare(existing)) => existing.push(comparison),
            _ => {
                self.clauses
                    .insert(field, Constraint::Compare(vec![comparison]));
            }
        }
        self
    }

    /// Add an `or` constraint for one field
    #[must_use]
    pub fn any_of(mut self, field: impl Into<String>, alternatives: Vec<Constraint>) -> Self {
        self.clauses.insert(
            field.into(),
            Constraint::Compare(vec![Comparison::any_of(alternatives)]),
        );
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, constraint: Constraint) {
        self.clauses.insert(field.into(), constraint);
    }

    pub fn remove(&mut self, field: &str) -> Option<Constraint> {
        self.clauses.remove(field)
    }

    /// Pull the free-text term out; a blank or non-string term is dropped
    pub fn split_search(&self) -> (Self, Option<String>) {
        let mut rest = self.clone();
        let term = match rest.remove(SEARCH_KEY) {
            Some(Constraint::Equals(FilterValue::String(term))) => {
                let term = term.trim();
                (!term.is_empty()).then(|| term.to_string())
            }
            Some(_) => {
                tracing::debug!("ignoring non-string search term");
                None
            }
            None => None,
        };
        (rest, term)
    }

    pub fn get(&self, field: &str) -> Option<&Constraint> {
        self.clauses.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.clauses.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Constraint)> {
        self.clauses.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl FromIterator<(String, Constraint)> for FilterDescription {
    fn from_iter<I: IntoIterator<Item = (String, Constraint)>>(iter: I) -> Self {
        Self {
            clauses: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_search() {
        let filters = FilterDescription::new().eq("search", "  boot ").eq("category", "shoes");
        let (rest, term) = filters.split_search();
        assert_eq!(term.as_deref(), Some("boot"));
        assert!(!rest.contains(SEARCH_KEY));
        assert!(rest.contains("category"));

        let (_, blank) = FilterDescription::new().eq("search", "   ").split_search();
        assert!(blank.is_none());
        let (rest, numeric) = FilterDescription::new().eq("search", 7_i64).split_search();
        assert!(numeric.is_none());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_operator_parse_accepts_both_spellings() {
        for op in FilterOperator::ALL {
            assert_eq!(FilterOperator::parse(op.name()), Some(op));
            assert_eq!(FilterOperator::parse(&format!("${}", op.name())), Some(op));
        }
        assert_eq!(FilterOperator::parse("$regex"), None);
        assert_eq!(FilterOperator::parse("like"), None);
    }

    #[test]
    fn test_filter_value_from_json() {
        assert_eq!(FilterValue::from_json(&json!(null)), Some(FilterValue::Null));
        assert_eq!(FilterValue::from_json(&json!(7)), Some(FilterValue::Integer(7)));
        assert_eq!(FilterValue::from_json(&json!(1.5)), Some(FilterValue::Float(1.5)));
        assert_eq!(
            FilterValue::from_json(&json!(["a", 1])),
            Some(FilterValue::List(vec!["a".into(), 1_i64.into()]))
        );
        assert_eq!(FilterValue::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_blank_values() {
        assert!(FilterValue::Null.is_blank());
        assert!(FilterValue::from("").is_blank());
        assert!(!FilterValue::from(" ").is_blank());
        assert!(!FilterValue::from(0_i64).is_blank());
        assert!(!FilterValue::List(vec![]).is_blank());
    }

    #[test]
    fn test_from_json_literal_and_operators() {
        let filter = FilterDescription::from_json(&json!({
            "role": "vendor",
            "price": {"gte": 10, "$lt": 100},
        }));
        assert_eq!(filter.len(), 2);
        assert_eq!(
            filter.get("role"),
            Some(&Constraint::Equals(FilterValue::from("vendor")))
        );
        let Some(Constraint::Compare(comparisons)) = filter.get("price") else {
            panic!("expected comparisons");
        };
        assert!(comparisons.contains(&Comparison::new(FilterOperator::GreaterThanOrEqual, 10_i64)));
        assert!(comparisons.contains(&Comparison::new(FilterOperator::LessThan, 100_i64)));
    }

    #[test]
    fn test_from_json_or_alternatives() {
        let filter = FilterDescription::from_json(&json!({
            "status": {"or": ["pending", {"ne": "cancelled"}]}
        }));
        let Some(Constraint::Compare(comparisons)) = filter.get("status") else {
            panic!("expected comparisons");
        };
        assert_eq!(
            comparisons[0].operand,
            Operand::AnyOf(vec![
                Constraint::Equals("pending".into()),
                Constraint::Compare(vec![Comparison::new(FilterOperator::NotEqual, "cancelled")]),
            ])
        );
    }

    #[test]
    fn test_from_json_in_accepts_scalar() {
        let filter = FilterDescription::from_json(&json!({"category": {"$in": "shoes"}}));
        assert_eq!(
            filter.get("category"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::In,
                vec!["shoes"]
            )]))
        );
    }

    #[test]
    fn test_from_json_array_literal_is_in() {
        let filter = FilterDescription::from_json(&json!({"status": ["paid", "shipped"]}));
        assert_eq!(
            filter.get("status"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::In,
                vec!["paid", "shipped"]
            )]))
        );
    }

    #[test]
    fn test_from_json_non_object_is_empty() {
        assert!(FilterDescription::from_json(&json!("status")).is_empty());
        assert!(FilterDescription::from_json(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_builder_merges_comparisons() {
        let filter = FilterDescription::new()
            .compare("createdAt", FilterOperator::GreaterThanOrEqual, "2024-01-01")
            .compare("createdAt", FilterOperator::LessThan, "2024-02-01")
            .eq("status", "paid");
        let Some(Constraint::Compare(comparisons)) = filter.get("createdAt") else {
            panic!("expected comparisons");
        };
        assert_eq!(comparisons.len(), 2);
        assert!(filter.contains("status"));
    }
}
