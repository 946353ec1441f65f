//! A document store that records every call before delegating.
//!
//! Tests use it to check the exact filter, update or pipeline that reached
//! the store after the tenancy hooks ran.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use helios_tenancy::StoreError;
use helios_tenancy::schema::IndexSpec;
use helios_tenancy::store::{
    BulkWriteOp, BulkWriteOptions, BulkWriteResult, DeleteResult, Document, DocumentStore,
    FindAndModifyOptions, FindOptions, InsertManyOptions, MemoryStore, Modification,
    UpdateOptions, UpdateResult,
};

type StoreResult<T> = Result<T, StoreError>;

/// One call that reached the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Store method name.
    pub method: &'static str,
    /// Target collection.
    pub collection: String,
    /// The arguments that matter to the tenancy layer.
    pub payload: Value,
}

/// Wraps a [`MemoryStore`] and records every call.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Returns every recorded call, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the most recent call.
    pub fn last_call(&self) -> RecordedCall {
        self.calls
            .lock()
            .last()
            .cloned()
            .expect("at least one store call")
    }

    /// Returns the recorded calls of `method`.
    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, method: &'static str, collection: &str, payload: Value) {
        self.calls.lock().push(RecordedCall {
            method,
            collection: collection.to_string(),
            payload,
        });
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    fn backend_name(&self) -> &'static str {
        "recording"
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        self.record("create_index", collection, json!({"name": index.name()}));
        self.inner.create_index(collection, index).await
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        self.record("list_indexes", collection, Value::Null);
        self.inner.list_indexes(collection).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: &InsertManyOptions,
    ) -> StoreResult<Vec<Document>> {
        self.record("insert_many", collection, json!({"documents": documents}));
        self.inner.insert_many(collection, documents, options).await
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        self.record("find", collection, json!({"filter": filter}));
        self.inner.find(collection, filter, options).await
    }

    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        self.record("count", collection, json!({"filter": filter}));
        self.inner.count(collection, filter).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        self.record(
            "update",
            collection,
            json!({
                "filter": filter,
                "update": update,
                "multi": options.multi,
                "upsert": options.upsert,
                "replace": options.replace
            }),
        );
        self.inner.update(collection, filter, update, options).await
    }

    async fn find_one_and_modify(
        &self,
        collection: &str,
        filter: &Document,
        modification: &Modification,
        options: &FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        let (kind, body) = match modification {
            Modification::Update(update) => ("update", Value::Object(update.clone())),
            Modification::Replace(replacement) => ("replace", Value::Object(replacement.clone())),
            Modification::Delete => ("delete", Value::Null),
        };
        self.record(
            "find_one_and_modify",
            collection,
            json!({"filter": filter, "kind": kind, "update": body}),
        );
        self.inner
            .find_one_and_modify(collection, filter, modification, options)
            .await
    }

    async fn delete(
        &self,
        collection: &str,
        filter: &Document,
        multi: bool,
    ) -> StoreResult<DeleteResult> {
        self.record("delete", collection, json!({"filter": filter, "multi": multi}));
        self.inner.delete(collection, filter, multi).await
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Document>> {
        self.record("aggregate", collection, json!({"pipeline": pipeline}));
        self.inner.aggregate(collection, pipeline).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        operations: &[BulkWriteOp],
        options: &BulkWriteOptions,
    ) -> StoreResult<BulkWriteResult> {
        self.record(
            "bulk_write",
            collection,
            json!({"operations": serde_json::to_value(operations)?}),
        );
        self.inner.bulk_write(collection, operations, options).await
    }
}
