use std::fmt::Debug;

use async_trait::async_trait;
use tokio::sync::broadcast;

use abi::errors::Result;
use abi::model::{ChangeEvent, CollectionPath, DocPath, Document, FieldValue, Fields};

/// The document database the friendship graph lives in.
///
/// Every write is atomic per document only; nothing spans two documents.
/// Successful writes are published on the change feed returned by
/// [`DocumentStore::subscribe`].
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// point read, `None` if the document does not exist
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// create or replace; `FieldValue::ServerTimestamp` is resolved to the commit time
    async fn set(&self, path: &DocPath, fields: Fields) -> Result<Document>;

    /// deleting a missing document is not an error
    async fn delete(&self, path: &DocPath) -> Result<()>;

    /// documents directly inside `collection`, ordered by path
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>>;

    /// documents of every collection whose last segment is `collection_id`
    async fn list_group(&self, collection_id: &str) -> Result<Vec<Document>>;

    /// equality query on one top-level field
    async fn find_by_field(
        &self,
        collection: &CollectionPath,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>>;

    /// change feed; receivers only see events published after subscribing
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    async fn exists(&self, path: &DocPath) -> Result<bool> {
        Ok(self.get(path).await?.is_some())
    }
}
