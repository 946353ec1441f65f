//! Document store abstraction.
//!
//! The tenancy layer never talks to a database directly. Every read, write
//! and aggregation a model performs ends in exactly one call on a
//! [`DocumentStore`]. The trait is deliberately narrow: it is the surface a
//! document database driver would expose to a data-mapping layer.
//!
//! [`MemoryStore`] is an in-process implementation used as the reference
//! backend in tests and examples.

mod bulk;
pub(crate) mod filter;
mod memory;
mod pipeline;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreResult;
use crate::schema::IndexSpec;

pub use bulk::{
    BulkWriteOp, DeleteModel, InsertOneModel, KNOWN_KINDS, ReplaceOneModel, UpdateModel, known_kind,
};
pub use memory::{MemoryStore, MemoryStoreConfig};

/// A stored document: an ordered JSON object.
pub type Document = serde_json::Map<String, Value>;

/// Options for [`DocumentStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Sort specification (`{field: 1 | -1}`).
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: Option<usize>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

/// Options for [`DocumentStore::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every matching document instead of the first.
    pub multi: bool,
    /// Insert a document when nothing matches.
    pub upsert: bool,
    /// Treat the update as a full replacement document.
    pub replace: bool,
}

/// What [`DocumentStore::find_one_and_modify`] does to the matched document.
#[derive(Debug, Clone, PartialEq)]
pub enum Modification {
    /// Apply an update operator document.
    Update(Document),
    /// Replace the document, keeping its `_id`.
    Replace(Document),
    /// Delete the document.
    Delete,
}

/// Options for [`DocumentStore::find_one_and_modify`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    /// Picks the first document in this order.
    pub sort: Option<Document>,
    /// Insert a document when nothing matches.
    pub upsert: bool,
    /// Return the document after modification instead of before.
    pub return_new: bool,
}

/// Options for [`DocumentStore::insert_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertManyOptions {
    /// Stop at the first failing document.
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

/// Options for [`DocumentStore::bulk_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteOptions {
    /// Stop at the first failing operation.
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

fn default_ordered() -> bool {
    true
}

impl Default for InsertManyOptions {
    fn default() -> Self {
        Self {
            ordered: default_ordered(),
        }
    }
}

impl Default for BulkWriteOptions {
    fn default() -> Self {
        Self {
            ordered: default_ordered(),
        }
    }
}

/// Outcome of an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually changed.
    pub modified_count: u64,
    /// `_id` of the upserted document, if one was inserted.
    pub upserted_id: Option<Value>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    /// Documents removed.
    pub deleted_count: u64,
}

/// Outcome of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteResult {
    /// Documents inserted by `insertOne` operations.
    pub inserted_count: u64,
    /// Documents matched by update and replace operations.
    pub matched_count: u64,
    /// Documents changed by update and replace operations.
    pub modified_count: u64,
    /// Documents removed by delete operations.
    pub deleted_count: u64,
    /// Documents inserted by upserts.
    pub upserted_count: u64,
    /// `_id` values of inserted documents, in operation order.
    pub inserted_ids: Vec<Value>,
}

/// The operations a document database exposes to the data-mapping layer.
///
/// Implementations must be safe to share between tasks. Every method is a
/// single round trip; the tenancy layer never retries.
#[async_trait]
pub trait DocumentStore: Send + Sync + fmt::Debug {
    /// Short name of the backend, used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Creates an index on `collection`.
    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()>;

    /// Lists the indexes of `collection`.
    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>>;

    /// Inserts documents, assigning `_id` where missing. Returns the stored
    /// documents.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: &InsertManyOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Returns the documents matching `filter`.
    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>>;

    /// Counts the documents matching `filter`.
    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Updates or replaces documents matching `filter`.
    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult>;

    /// Atomically finds one document and modifies it.
    async fn find_one_and_modify(
        &self,
        collection: &str,
        filter: &Document,
        modification: &Modification,
        options: &FindAndModifyOptions,
    ) -> StoreResult<Option<Document>>;

    /// Deletes the first (or every, with `multi`) document matching `filter`.
    async fn delete(&self, collection: &str, filter: &Document, multi: bool)
    -> StoreResult<DeleteResult>;

    /// Runs an aggregation pipeline.
    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Document>>;

    /// Executes a batch of write operations.
    async fn bulk_write(
        &self,
        collection: &str,
        operations: &[BulkWriteOp],
        options: &BulkWriteOptions,
    ) -> StoreResult<BulkWriteResult>;
}
