//! Document target: MongoDB filter documents
//!
//! Operators map one to one onto `$`-keywords. Field-level `or`
//! alternatives are lifted to a top-level `$or` of single-field clauses; when
//! several such groups exist (or a text search adds one) they are combined
//! under `$and`.

use mongodb::bson::{self, doc, Bson, Document};

use crate::repository::{Constraint, FilterDescription, FilterOperator, FilterValue, Operand};

/// `$`-keyword for an operator
pub const fn operator_keyword(operator: FilterOperator) -> &'static str {
    match operator {
        FilterOperator::GreaterThanOrEqual => "$gte",
        FilterOperator::LessThanOrEqual => "$lte",
        FilterOperator::GreaterThan => "$gt",
        FilterOperator::LessThan => "$lt",
        FilterOperator::NotEqual => "$ne",
        FilterOperator::In => "$in",
        FilterOperator::Or => "$or",
    }
}

/// Filter document under construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    fields: Document,
    any_of: Vec<Vec<Document>>,
}

impl DocumentQuery {
    /// Translate a normalized filter
    pub fn from_filter(filter: &FilterDescription) -> Self {
        let mut query = Self::default();
        for (field, constraint) in filter.iter() {
            if field.starts_with('$') {
                tracing::debug!(field, "dropping operator-like field name from document filter");
                continue;
            }
            query.add_constraint(field, constraint);
        }
        query
    }

    /// Require at least one of `alternatives` to match
    ///
    /// An empty set of alternatives matches nothing.
    pub fn push_any(&mut self, alternatives: Vec<Document>) {
        if alternatives.is_empty() {
            self.any_of.push(vec![doc! { "_id": { "$in": [] } }]);
        } else {
            self.any_of.push(alternatives);
        }
    }

    pub fn into_document(self) -> Document {
        let Self {
            mut fields,
            mut any_of,
        } = self;
        match any_of.len() {
            0 => {}
            1 => {
                let group = any_of.remove(0);
                fields.insert("$or", group);
            }
            _ => {
                let groups: Vec<Document> =
                    any_of.into_iter().map(|group| doc! { "$or": group }).collect();
                fields.insert("$and", groups);
            }
        }
        fields
    }

    fn add_constraint(&mut self, field: &str, constraint: &Constraint) {
        match constraint {
            Constraint::Equals(FilterValue::List(values)) => {
                self.merge_operators(field, doc! { "$in": list_to_bson(values) });
            }
            Constraint::Equals(value) => {
                self.fields.insert(field, to_bson(value));
            }
            Constraint::Compare(comparisons) => {
                let mut operators = Document::new();
                for comparison in comparisons {
                    match (comparison.operator, &comparison.operand) {
                        (FilterOperator::Or, Operand::AnyOf(alternatives)) => {
                            let branches = alternatives
                                .iter()
                                .map(|alt| {
                                    let mut branch = DocumentQuery::default();
                                    branch.add_constraint(field, alt);
                                    branch.into_document()
                                })
                                .collect();
                            self.push_any(branches);
                        }
                        (FilterOperator::In, Operand::Value(FilterValue::List(values))) => {
                            operators.insert("$in", list_to_bson(values));
                        }
                        (FilterOperator::In, Operand::Value(value)) => {
                            operators.insert("$in", vec![to_bson(value)]);
                        }
                        (operator, Operand::Value(value)) if operator != FilterOperator::Or => {
                            operators.insert(operator_keyword(operator), to_bson(value));
                        }
                        (operator, _) => {
                            tracing::debug!(field, %operator, "ignoring malformed comparison");
                        }
                    }
                }
                if !operators.is_empty() {
                    self.merge_operators(field, operators);
                }
            }
        }
    }

    fn merge_operators(&mut self, field: &str, operators: Document) {
        match self.fields.get_mut(field) {
            Some(Bson::Document(existing)) => existing.extend(operators),
            _ => {
                self.fields.insert(field, operators);
            }
        }
    }
}

/// Translate a normalized filter straight to a filter document
pub fn to_document_filter(filter: &FilterDescription) -> Document {
    DocumentQuery::from_filter(filter).into_document()
}

/// Case-insensitive regex alternatives of `term` over the searchable fields
pub fn text_search(term: &str, fields: &[&str]) -> Vec<Document> {
    let pattern = regex::escape(term);
    fields
        .iter()
        .map(|field| doc! { *field: { "$regex": pattern.as_str(), "$options": "i" } })
        .collect()
}

/// BSON form of a filter literal; timestamps become BSON dates
pub fn to_bson(value: &FilterValue) -> Bson {
    match value {
        FilterValue::Null => Bson::Null,
        FilterValue::Boolean(b) => Bson::Boolean(*b),
        FilterValue::Integer(n) => Bson::Int64(*n),
        FilterValue::Float(n) => Bson::Double(*n),
        FilterValue::String(s) => Bson::String(s.clone()),
        FilterValue::Timestamp(ts) => {
            Bson::DateTime(bson::DateTime::from_millis(ts.timestamp_millis()))
        }
        FilterValue::List(items) => list_to_bson(items),
    }
}

fn list_to_bson(items: &[FilterValue]) -> Bson {
    Bson::Array(items.iter().map(to_bson).collect())
}
