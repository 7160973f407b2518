//! Repository error types
//!
//! A [`RepositoryError`] carries the entity and operation a backend failure
//! happened in, so the repository boundary can log it with full context
//! before folding it into a `ResultEnvelope`.
//!
//! # Example
//!
//! ```rust
//! use marketplace_store::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::not_found("User", "usr_123");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.operation, RepositoryOperation::FindById);
//! ```

use std::fmt;

use crate::error::{DatabaseErrorKind, Error};

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Finding a single entity by ID
    FindById,
    /// Finding multiple entities with filters
    FindAll,
    /// Finding the first entity matching filters
    FindOne,
    /// Counting entities matching filters
    Count,
    /// Summing a field over matching entities
    Sum,
    /// Creating a new entity
    Create,
    /// Updating an existing entity
    Update,
    /// Deleting an entity
    Delete,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FindById => write!(f, "find_by_id"),
            Self::FindAll => write!(f, "find_all"),
            Self::FindOne => write!(f, "find_one"),
            Self::Count => write!(f, "count"),
            Self::Sum => write!(f, "sum"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Entity was not found
    NotFound,
    /// Database constraint violation
    ConstraintViolation,
    /// Failed to connect to the backend
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Operation was cancelled during shutdown
    Cancelled,
    /// No backend is available for writes
    Unavailable,
    /// Underlying database error
    DatabaseError,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "User", "Order")
    pub entity_type: Option<String>,
    /// The ID of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::FindById,
            kind: RepositoryErrorKind::NotFound,
            message: "Entity not found".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
        }
    }

    /// Write attempted with no reachable backend
    pub fn unavailable(operation: RepositoryOperation, entity_type: impl Into<String>) -> Self {
        let entity_type = entity_type.into();
        Self {
            operation,
            kind: RepositoryErrorKind::Unavailable,
            message: format!("{entity_type} storage is unavailable"),
            entity_type: Some(entity_type),
            entity_id: None,
        }
    }

    /// Classify a backend failure
    pub fn from_backend(operation: RepositoryOperation, err: &Error) -> Self {
        let kind = match err {
            Error::Timeout(_) => RepositoryErrorKind::Timeout,
            Error::Cancelled => RepositoryErrorKind::Cancelled,
            Error::Database(db) | Error::Document(db) => match db.kind {
                DatabaseErrorKind::NotFound => RepositoryErrorKind::NotFound,
                DatabaseErrorKind::ConstraintViolation => RepositoryErrorKind::ConstraintViolation,
                DatabaseErrorKind::ConnectionFailed | DatabaseErrorKind::PoolExhausted => {
                    RepositoryErrorKind::ConnectionFailed
                }
                DatabaseErrorKind::Timeout => RepositoryErrorKind::Timeout,
                DatabaseErrorKind::TypeConversion => RepositoryErrorKind::SerializationError,
                _ => RepositoryErrorKind::DatabaseError,
            },
            _ => RepositoryErrorKind::Other,
        };
        let message = match err.database_error() {
            Some(db) => db.message.clone(),
            None => err.to_string(),
        };
        Self::new(operation, kind, message)
    }

    /// Add entity type context
    #[must_use]
    pub fn for_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Add entity id context
    #[must_use]
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.entity_type, &self.entity_id) {
            (Some(entity_type), Some(entity_id)) => write!(f, " [{}: {}]", entity_type, entity_id)?,
            (Some(entity_type), None) => write!(f, " [{}]", entity_type)?,
            _ => {}
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, DatabaseOperation};
    use std::time::Duration;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::FindById), "find_by_id");
        assert_eq!(format!("{}", RepositoryOperation::FindAll), "find_all");
        assert_eq!(format!("{}", RepositoryOperation::FindOne), "find_one");
        assert_eq!(format!("{}", RepositoryOperation::Count), "count");
        assert_eq!(format!("{}", RepositoryOperation::Sum), "sum");
        assert_eq!(format!("{}", RepositoryOperation::Create), "create");
        assert_eq!(format!("{}", RepositoryOperation::Update), "update");
        assert_eq!(format!("{}", RepositoryOperation::Delete), "delete");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(format!("{}", RepositoryErrorKind::NotFound), "not_found");
        assert_eq!(format!("{}", RepositoryErrorKind::Cancelled), "cancelled");
        assert_eq!(format!("{}", RepositoryErrorKind::Unavailable), "unavailable");
        assert_eq!(
            format!("{}", RepositoryErrorKind::DatabaseError),
            "database_error"
        );
    }

    #[test]
    fn test_unavailable_message() {
        let error = RepositoryError::unavailable(RepositoryOperation::Create, "Product");
        assert_eq!(error.kind, RepositoryErrorKind::Unavailable);
        assert_eq!(error.message, "Product storage is unavailable");
    }

    #[test]
    fn test_from_backend_classification() {
        let timeout = RepositoryError::from_backend(
            RepositoryOperation::FindAll,
            &Error::Timeout(Duration::from_secs(5)),
        );
        assert_eq!(timeout.kind, RepositoryErrorKind::Timeout);
        assert!(timeout.is_retriable());

        let cancelled = RepositoryError::from_backend(RepositoryOperation::Update, &Error::Cancelled);
        assert_eq!(cancelled.kind, RepositoryErrorKind::Cancelled);
        assert!(!cancelled.is_retriable());

        let constraint = RepositoryError::from_backend(
            RepositoryOperation::Create,
            &Error::Database(DatabaseError::new(
                DatabaseOperation::Insert,
                DatabaseErrorKind::ConstraintViolation,
                "duplicate key value",
            )),
        );
        assert_eq!(constraint.kind, RepositoryErrorKind::ConstraintViolation);
        assert_eq!(constraint.message, "duplicate key value");
    }

    #[test]
    fn test_display_with_entity() {
        let error = RepositoryError::not_found("User", "usr_123");
        let display = format!("{}", error);
        assert!(display.contains("not_found"));
        assert!(display.contains("find_by_id"));
        assert!(display.contains("[User: usr_123]"));
    }

    #[test]
    fn test_display_with_entity_type_only() {
        let error = RepositoryError::new(
            RepositoryOperation::Count,
            RepositoryErrorKind::DatabaseError,
            "relation does not exist",
        )
        .for_entity("Order");
        assert!(error.to_string().ends_with("[Order]"));
    }

    #[test]
    fn test_error_is_error_trait() {
        let error: Box<dyn std::error::Error> = Box::new(RepositoryError::not_found("User", "123"));
        assert!(error.to_string().contains("not_found"));
    }
}
