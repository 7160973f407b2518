//! Conversions between JSON records and BSON documents
//!
//! Records leaving the document store always look like relational rows: the
//! `_id` key is exposed as a string `id` and dates are RFC 3339 strings.
//! Records entering it get their date fields stored as BSON dates so range
//! filters compare like with like.

use chrono::{DateTime, SecondsFormat, Utc};
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use serde_json::{Map, Number, Value};

use crate::repository::{FilterValue, Record};
use crate::translate::normalize::parse_timestamp;

/// Filter matching a single document by id
///
/// Ids that parse as an `ObjectId` match one; anything else matches a string
/// `_id`.
pub fn id_filter(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "_id": oid },
        Err(_) => doc! { "_id": id },
    }
}

/// Convert a stored document to a record, renaming `_id` to `id`
pub fn document_to_record(document: Document) -> Record {
    let mut record = Map::with_capacity(document.len());
    for (key, value) in document {
        if key == "_id" {
            record.insert("id".to_string(), bson_to_json(value));
        } else {
            record.insert(key, bson_to_json(value));
        }
    }
    record
}

/// Convert a record to a document for writing
///
/// `id`/`_id` are left out; the store owns identity. Top-level `date_fields`
/// holding a parsable date are stored as BSON dates.
pub fn record_to_document(record: &Record, date_fields: &[&str]) -> Document {
    let mut document = Document::new();
    for (key, value) in record {
        if key == "id" || key == "_id" {
            continue;
        }
        let converted = if date_fields.contains(&key.as_str()) {
            date_to_bson(value).unwrap_or_else(|| json_to_bson(value))
        } else {
            json_to_bson(value)
        };
        document.insert(key.clone(), converted);
    }
    document
}

fn date_to_bson(value: &Value) -> Option<Bson> {
    let literal = FilterValue::from_json(value)?;
    if literal.is_blank() {
        return None;
    }
    parse_timestamp(&literal)
        .map(|ts| Bson::DateTime(bson::DateTime::from_millis(ts.timestamp_millis())))
}

pub fn json_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_bson(v)))
                .collect(),
        ),
    }
}

pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::from(n),
        Bson::Int64(n) => Value::from(n),
        Bson::Double(n) => Number::from_f64(n).map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis())
            .map_or(Value::Null, |ts| {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::Document(document) => Value::Object(
            document
                .into_iter()
                .map(|(k, v)| (k, bson_to_json(v)))
                .collect(),
        ),
        other => other.into_relaxed_extjson(),
    }
}
