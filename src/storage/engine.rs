use super::query::{Filter, Projection, Query};
use crate::core::{Document, Result};
use crate::diff::UpdateOp;
use async_trait::async_trait;

/// Document store contract the mapper relies on - allows pluggable backends.
///
/// Root documents are addressed by integer id inside a named collection.
/// `None` projections return whole documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, `NotFound` if absent.
    async fn fetch_one(
        &self,
        collection: &str,
        id: i64,
        projection: Option<&Projection>,
    ) -> Result<Document>;

    /// Fetch documents in the order of `ids`, `NotFound` if any is absent.
    async fn fetch_many(
        &self,
        collection: &str,
        ids: &[i64],
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>>;

    /// Documents matching `query`, in ascending id order.
    async fn find(
        &self,
        collection: &str,
        query: &Query,
        projection: Option<&Projection>,
    ) -> Result<Vec<Document>>;

    /// Number of documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize>;

    /// Insert a document and return the id the store assigned to it.
    async fn insert(&self, collection: &str, document: Document) -> Result<i64>;

    /// Apply all operations to one document as a single atomic change.
    async fn update(&self, collection: &str, id: i64, ops: &[UpdateOp]) -> Result<()>;

    /// Delete one document, `NotFound` if absent.
    async fn delete(&self, collection: &str, id: i64) -> Result<()>;

    /// Names of all known collections.
    async fn collections(&self) -> Vec<String>;
}
