//! Dialect-independent cleanup applied before translation
//!
//! Blank values (null, empty string) mean "not specified" and are pruned.
//! Values on date fields are coerced to timestamps; values that cannot be
//! coerced are dropped and a clause left with no comparisons disappears.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::repository::{Comparison, Constraint, FilterDescription, FilterValue, Operand};

/// Date fields every entity carries
pub const DEFAULT_DATE_FIELDS: &[&str] = &["createdAt", "updatedAt"];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Prune blank values and coerce date fields
pub fn normalize(filter: &FilterDescription, date_fields: &[&str]) -> FilterDescription {
    filter
        .iter()
        .filter_map(|(field, constraint)| {
            let is_date = date_fields.contains(&field);
            match normalize_constraint(constraint, is_date) {
                Some(constraint) => Some((field.to_string(), constraint)),
                None => {
                    tracing::debug!(field, "pruning empty filter clause");
                    None
                }
            }
        })
        .collect()
}

fn normalize_constraint(constraint: &Constraint, is_date: bool) -> Option<Constraint> {
    match constraint {
        Constraint::Equals(value) => normalize_value(value, is_date).map(Constraint::Equals),
        Constraint::Compare(comparisons) => {
            let kept: Vec<Comparison> = comparisons
                .iter()
                .filter_map(|c| normalize_comparison(c, is_date))
                .collect();
            (!kept.is_empty()).then_some(Constraint::Compare(kept))
        }
    }
}

fn normalize_comparison(comparison: &Comparison, is_date: bool) -> Option<Comparison> {
    let operand = match &comparison.operand {
        Operand::AnyOf(alternatives) => {
            let kept: Vec<Constraint> = alternatives
                .iter()
                .filter_map(|alt| normalize_constraint(alt, is_date))
                .collect();
            if kept.is_empty() {
                return None;
            }
            Operand::AnyOf(kept)
        }
        Operand::Value(value) => {
            let value = normalize_value(value, is_date)?;
            if comparison.operator.is_ordering() && !is_date {
                Operand::Value(ordering_operand(value))
            } else {
                Operand::Value(value)
            }
        }
    };
    Some(Comparison {
        operator: comparison.operator,
        operand,
    })
}

fn normalize_value(value: &FilterValue, is_date: bool) -> Option<FilterValue> {
    match value {
        // an explicitly empty list matches nothing and stays that way
        FilterValue::List(items) if items.is_empty() => Some(FilterValue::List(Vec::new())),
        FilterValue::List(items) => {
            let kept: Vec<FilterValue> = items
                .iter()
                .filter_map(|item| normalize_value(item, is_date))
                .collect();
            (!kept.is_empty()).then_some(FilterValue::List(kept))
        }
        blank if blank.is_blank() => None,
        other if is_date => match parse_timestamp(other) {
            Some(ts) => Some(FilterValue::Timestamp(ts)),
            None => {
                tracing::debug!(value = ?other, "dropping unparsable date value");
                None
            }
        },
        other => Some(other.clone()),
    }
}

/// Range bounds that look numeric compare as numbers, never as text
fn ordering_operand(value: FilterValue) -> FilterValue {
    let FilterValue::String(text) = &value else {
        return value;
    };
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return FilterValue::Integer(n);
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => FilterValue::Float(n),
        _ => value,
    }
}

/// Coerce a filter value to a UTC timestamp
///
/// Strings may be RFC 3339, `YYYY-MM-DD` (midnight UTC) or a naive
/// `YYYY-MM-DDTHH:MM:SS` (taken as UTC). Numbers are epoch milliseconds.
pub fn parse_timestamp(value: &FilterValue) -> Option<DateTime<Utc>> {
    match value {
        FilterValue::Timestamp(ts) => Some(*ts),
        FilterValue::String(s) => parse_date_str(s.trim()),
        FilterValue::Integer(millis) => DateTime::from_timestamp_millis(*millis),
        FilterValue::Float(millis) if millis.is_finite() => {
            DateTime::from_timestamp_millis(*millis as i64)
        }
        _ => None,
    }
}

pub(crate) fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::FilterOperator;
    use chrono::TimeZone;
    use serde_json::json;

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = jan_first();
        assert_eq!(parse_timestamp(&"2024-01-01T00:00:00Z".into()), Some(expected));
        assert_eq!(parse_timestamp(&"2024-01-01T02:00:00+02:00".into()), Some(expected));
        assert_eq!(parse_timestamp(&"2024-01-01".into()), Some(expected));
        assert_eq!(parse_timestamp(&"2024-01-01T00:00:00".into()), Some(expected));
        assert_eq!(
            parse_timestamp(&FilterValue::Integer(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&"not-a-date".into()), None);
        assert_eq!(parse_timestamp(&FilterValue::Boolean(true)), None);
    }

    #[test]
    fn test_blank_equality_pruned() {
        let filter = FilterDescription::from_json(&json!({
            "role": "",
            "status": null,
            "category": "shoes",
        }));
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert_eq!(normalized.len(), 1);
        assert!(normalized.contains("category"));
    }

    #[test]
    fn test_blank_operator_object_pruned() {
        let filter = FilterDescription::from_json(&json!({
            "price": {"gte": "", "lte": null},
            "stock": {"gt": 0, "lt": ""},
        }));
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert!(!normalized.contains("price"));
        assert_eq!(
            normalized.get("stock"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::GreaterThan,
                0_i64
            )]))
        );
    }

    #[test]
    fn test_date_values_coerced() {
        let filter = FilterDescription::from_json(&json!({
            "createdAt": {"gte": "2024-01-01T00:00:00Z"}
        }));
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert_eq!(
            normalized.get("createdAt"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::GreaterThanOrEqual,
                jan_first()
            )]))
        );
    }

    #[test]
    fn test_unparsable_date_removes_clause() {
        let filter = FilterDescription::from_json(&json!({
            "createdAt": {"gte": "not-a-date"}
        }));
        assert!(normalize(&filter, DEFAULT_DATE_FIELDS).is_empty());
    }

    #[test]
    fn test_unparsable_date_keeps_valid_siblings() {
        let filter = FilterDescription::from_json(&json!({
            "updatedAt": {"gte": "garbage", "lt": "2024-01-01"}
        }));
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert_eq!(
            normalized.get("updatedAt"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::LessThan,
                jan_first()
            )]))
        );
    }

    #[test]
    fn test_numeric_range_strings_become_numbers() {
        let filter = FilterDescription::from_json(&json!({
            "price": {"gte": "10", "lt": " 99.5 "},
            "sku": {"gte": "A-10"},
            "stock": {"ne": "3"},
        }));
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert_eq!(
            normalized.get("price"),
            Some(&Constraint::Compare(vec![
                Comparison::new(FilterOperator::GreaterThanOrEqual, 10_i64),
                Comparison::new(FilterOperator::LessThan, 99.5_f64),
            ]))
        );
        assert_eq!(
            normalized.get("sku"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::GreaterThanOrEqual,
                "A-10"
            )]))
        );
        assert_eq!(
            normalized.get("stock"),
            Some(&Constraint::Compare(vec![Comparison::new(FilterOperator::NotEqual, "3")]))
        );
    }

    #[test]
    fn test_non_date_field_strings_untouched() {
        let filter = FilterDescription::new().eq("sku", "2024-01-01");
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert_eq!(
            normalized.get("sku"),
            Some(&Constraint::Equals("2024-01-01".into()))
        );
    }

    #[test]
    fn test_in_list_blank_members_dropped() {
        let filter = FilterDescription::from_json(&json!({
            "status": {"in": ["paid", "", null]},
            "role": {"in": ["", null]},
            "vendor": {"in": []},
        }));
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert_eq!(
            normalized.get("status"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::In,
                vec!["paid"]
            )]))
        );
        assert!(!normalized.contains("role"));
        assert_eq!(
            normalized.get("vendor"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::In,
                FilterValue::List(vec![])
            )]))
        );
    }

    #[test]
    fn test_or_alternatives_pruned() {
        let filter = FilterDescription::from_json(&json!({
            "status": {"or": ["", "paid"]},
            "role": {"or": ["", null]},
        }));
        let normalized = normalize(&filter, DEFAULT_DATE_FIELDS);
        assert_eq!(
            normalized.get("status"),
            Some(&Constraint::Compare(vec![Comparison::any_of(vec![
                Constraint::Equals("paid".into())
            ])]))
        );
        assert!(!normalized.contains("role"));
    }

    #[test]
    fn test_entity_date_fields() {
        let filter = FilterDescription::from_json(&json!({"deliveredAt": {"lt": "2024-01-01"}}));
        let normalized = normalize(&filter, &["createdAt", "updatedAt", "deliveredAt"]);
        assert_eq!(
            normalized.get("deliveredAt"),
            Some(&Constraint::Compare(vec![Comparison::new(
                FilterOperator::LessThan,
                jan_first()
            )]))
        );
    }
}
