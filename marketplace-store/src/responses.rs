//! The uniform response contract
//!
//! Every repository call returns a [`ResultEnvelope`]; backend failures never
//! escape as errors. List reads carry a [`ListPage`] whose records are keyed by
//! the entity's plural name:
//!
//! ```json
//! { "success": true, "data": { "products": [], "pagination": { "current": 1, "pages": 0, "total": 0 } } }
//! ```
//!
//! With the `http` feature the envelope is an axum response (200 on success,
//! 404 for a miss, 500 for a backend error).
//!
//! # Example
//!
//! ```rust
//! use marketplace_store::repository::{PageRequest, PaginationResult};
//! use marketplace_store::responses::{ListPage, ResultEnvelope};
//! use serde_json::json;
//!
//! let page = ListPage::new("products", Vec::new(), PaginationResult::empty(&PageRequest::default()));
//! let envelope = ResultEnvelope::success(page);
//! assert_eq!(
//!     serde_json::to_value(&envelope).unwrap(),
//!     json!({"success": true, "data": {"products": [], "pagination": {"current": 1, "pages": 0, "total": 0}}})
//! );
//! ```

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::repository::{PaginationResult, Record};

/// `{success, data, message?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEnvelope<T> {
    pub success: bool,
    /// Serialized as `null` when absent
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ResultEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    /// Completed without a result, e.g. a write with no backend to take it
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
            error: None,
        }
    }

    /// Nothing matched; not an error
    pub fn not_found() -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: None,
        }
    }

    /// A backend or availability failure
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResultEnvelope<U> {
        ResultEnvelope {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
            error: self.error,
        }
    }

    /// Whether the failure came from a backend rather than a miss
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }
}

/// One page of records plus its pagination block
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    /// Plural entity name, used as the records key
    pub collection: &'static str,
    pub records: Vec<Record>,
    pub pagination: PaginationResult,
}

impl ListPage {
    pub fn new(collection: &'static str, records: Vec<Record>, pagination: PaginationResult) -> Self {
        Self {
            collection,
            records,
            pagination,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Serialize for ListPage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(self.collection, &self.records)?;
        map.serialize_entry("pagination", &self.pagination)?;
        map.end()
    }
}

#[cfg(feature = "http")]
mod http {
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        Json,
    };
    use serde::Serialize;

    use super::ResultEnvelope;

    impl<T: Serialize> IntoResponse for ResultEnvelope<T> {
        fn into_response(self) -> Response {
            let status = if self.success {
                StatusCode::OK
            } else if self.error.is_some() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::NOT_FOUND
            };
            (status, Json(self)).into_response()
        }
    }
}
