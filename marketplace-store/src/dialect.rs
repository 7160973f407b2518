//! Backend selection
//!
//! A [`ModelHandle`] is what bootstrap knows about one entity's storage: an
//! optional relational table and an optional document collection, either of
//! which may still be initializing. [`ModelHandle::resolve`] picks the live
//! one (relational first) and the resulting [`Backend`] is frozen into the
//! repository for its whole lifetime.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use marketplace_store::dialect::{Dialect, ModelHandle};
//! use marketplace_store::memory::{MemoryCollection, MemoryTable};
//!
//! let table = Arc::new(MemoryTable::new("products", ["id", "name", "createdAt"]));
//! let collection = Arc::new(MemoryCollection::new("products"));
//!
//! let both = ModelHandle::new(Some(table.clone()), Some(collection.clone()));
//! assert_eq!(both.resolve().dialect(), Dialect::Relational);
//!
//! table.set_ready(false);
//! assert_eq!(both.resolve().dialect(), Dialect::Document);
//!
//! assert_eq!(ModelHandle::none().resolve().dialect(), Dialect::Unavailable);
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::repository::{DocumentStore, RelationalStore};

/// Which storage dialect an object talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Relational,
    Document,
    /// Neither backend is live
    Unavailable,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::Document => write!(f, "document"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// The backend a repository was bound to at construction
#[derive(Clone)]
pub enum Backend {
    Relational(Arc<dyn RelationalStore>),
    Document(Arc<dyn DocumentStore>),
    Unavailable,
}

impl Backend {
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Relational(_) => Dialect::Relational,
            Self::Document(_) => Dialect::Document,
            Self::Unavailable => Dialect::Unavailable,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational(store) => f.debug_tuple("Relational").field(&store.table()).finish(),
            Self::Document(store) => f
                .debug_tuple("Document")
                .field(&store.collection())
                .finish(),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// Optional relational and document handles for one entity
#[derive(Clone, Default)]
pub struct ModelHandle {
    relational: Option<Arc<dyn RelationalStore>>,
    document: Option<Arc<dyn DocumentStore>>,
}

impl ModelHandle {
    pub fn new(
        relational: Option<Arc<dyn RelationalStore>>,
        document: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        Self {
            relational,
            document,
        }
    }

    /// Handle with no backend at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn relational(store: Arc<dyn RelationalStore>) -> Self {
        Self::new(Some(store), None)
    }

    pub fn document(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(None, Some(store))
    }

    #[must_use]
    pub fn with_relational(mut self, store: Arc<dyn RelationalStore>) -> Self {
        self.relational = Some(store);
        self
    }

    #[must_use]
    pub fn with_document(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.document = Some(store);
        self
    }

    /// Relational handle, if present and ready
    pub fn live_relational(&self) -> Option<&Arc<dyn RelationalStore>> {
        self.relational.as_ref().filter(|store| store.is_ready())
    }

    /// Document handle, if present and ready
    pub fn live_document(&self) -> Option<&Arc<dyn DocumentStore>> {
        self.document.as_ref().filter(|store| store.is_ready())
    }

    /// Whether any handle is live right now
    pub fn is_live(&self) -> bool {
        self.live_relational().is_some() || self.live_document().is_some()
    }

    /// Pick the live backend, relational first
    pub fn resolve(&self) -> Backend {
        if let Some(store) = self.live_relational() {
            Backend::Relational(Arc::clone(store))
        } else if let Some(store) = self.live_document() {
            Backend::Document(Arc::clone(store))
        } else {
            Backend::Unavailable
        }
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("relational", &self.relational.as_ref().map(|s| s.table().to_string()))
            .field("document", &self.document.as_ref().map(|s| s.collection().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCollection, MemoryTable};

    #[test]
    fn test_relational_preferred_when_both_ready() {
        let handle = ModelHandle::none()
            .with_relational(Arc::new(MemoryTable::new("users", ["id"])))
            .with_document(Arc::new(MemoryCollection::new("users")));
        assert_eq!(handle.resolve().dialect(), Dialect::Relational);
    }

    #[test]
    fn test_document_only() {
        let handle = ModelHandle::document(Arc::new(MemoryCollection::new("orders")));
        assert_eq!(handle.resolve().dialect(), Dialect::Document);
    }

    #[test]
    fn test_not_ready_handles_are_skipped() {
        let table = Arc::new(MemoryTable::new("users", ["id"]));
        let collection = Arc::new(MemoryCollection::new("users"));
        table.set_ready(false);
        collection.set_ready(false);
        let handle = ModelHandle::new(Some(table), Some(collection));
        assert!(!handle.is_live());
        assert_eq!(handle.resolve().dialect(), Dialect::Unavailable);
    }

    #[test]
    fn test_resolution_is_a_snapshot() {
        let table = Arc::new(MemoryTable::new("users", ["id"]));
        let handle = ModelHandle::relational(table.clone());
        let backend = handle.resolve();
        table.set_ready(false);
        assert_eq!(backend.dialect(), Dialect::Relational);
        assert_eq!(handle.resolve().dialect(), Dialect::Unavailable);
    }

    #[test]
    fn test_dialect_display() {
        assert_eq!(Dialect::Relational.to_string(), "relational");
        assert_eq!(Dialect::Unavailable.to_string(), "unavailable");
    }
}
