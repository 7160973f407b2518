//! MongoDB collection backend

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

use crate::error::{DatabaseError, DatabaseOperation, Error, Result};
use crate::repository::{DocumentStore, Pagination, Record};
use crate::translate::codec::{document_to_record, id_filter};

/// One collection of a MongoDB database
#[derive(Debug, Clone)]
pub struct MongoCollection {
    name: String,
    collection: Collection<Document>,
}

impl MongoCollection {
    pub fn new(database: &Database, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            collection: database.collection::<Document>(&name),
            name,
        }
    }

    fn failed(&self, operation: DatabaseOperation) -> impl FnOnce(mongodb::error::Error) -> Error + '_ {
        move |e| Error::Document(DatabaseError::from(e).during(operation).add_context(self.name.clone()))
    }
}

#[async_trait]
impl DocumentStore for MongoCollection {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: Document, sort: Document, window: Pagination) -> Result<Vec<Record>> {
        let cursor = self
            .collection
            .find(filter)
            .sort(sort)
            .skip(window.offset)
            .limit(i64::try_from(window.limit).unwrap_or(i64::MAX))
            .await
            .map_err(self.failed(DatabaseOperation::Query))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(self.failed(DatabaseOperation::Query))?;
        Ok(documents.into_iter().map(document_to_record).collect())
    }

    async fn count_documents(&self, filter: Document) -> Result<u64> {
        self.collection
            .count_documents(filter)
            .await
            .map_err(self.failed(DatabaseOperation::Aggregate))
    }

    async fn sum(&self, field: &str, filter: Document) -> Result<f64> {
        let pipeline = vec![
            doc! { "$match": filter },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": format!("${field}") } } },
        ];
        let mut cursor = self
            .collection
            .aggregate(pipeline)
            .await
            .map_err(self.failed(DatabaseOperation::Aggregate))?;
        let group = cursor
            .try_next()
            .await
            .map_err(self.failed(DatabaseOperation::Aggregate))?;
        Ok(group
            .and_then(|group| match group.get("total") {
                Some(Bson::Int32(n)) => Some(f64::from(*n)),
                Some(Bson::Int64(n)) => Some(*n as f64),
                Some(Bson::Double(n)) => Some(*n),
                _ => None,
            })
            .unwrap_or(0.0))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        let document = self
            .collection
            .find_one(id_filter(id))
            .await
            .map_err(self.failed(DatabaseOperation::Query))?;
        Ok(document.map(document_to_record))
    }

    async fn insert_one(&self, mut document: Document) -> Result<Record> {
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        self.collection
            .insert_one(&document)
            .await
            .map_err(self.failed(DatabaseOperation::Insert))?;
        Ok(document_to_record(document))
    }

    async fn update_by_id(&self, id: &str, changes: Document) -> Result<Option<Record>> {
        let document = self
            .collection
            .find_one_and_update(id_filter(id), doc! { "$set": changes })
            .return_document(ReturnDocument::After)
            .await
            .map_err(self.failed(DatabaseOperation::Update))?;
        Ok(document.map(document_to_record))
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let result = self
            .collection
            .delete_one(id_filter(id))
            .await
            .map_err(self.failed(DatabaseOperation::Delete))?;
        Ok(result.deleted_count > 0)
    }
}
