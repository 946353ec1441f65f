//! In-memory document store.
//!
//! [`MemoryStore`] keeps every collection in a `Vec` behind a
//! `parking_lot::RwLock`. It implements filter matching, the common update
//! operators, a subset of aggregation stages and unique index enforcement,
//! which is enough to exercise the tenancy layer end to end.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::schema::IndexSpec;

use super::filter::{
    apply_update, compare_documents, get_path, is_operator_document, malformed, matches,
    seed_from_filter, values_equal,
};
use super::{
    BulkWriteOp, BulkWriteOptions, BulkWriteResult, DeleteResult, Document, DocumentStore,
    FindAndModifyOptions, FindOptions, InsertManyOptions, Modification, UpdateOptions,
    UpdateResult, pipeline,
};

const BACKEND_NAME: &str = "memory";

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStoreConfig {
    /// Reject writes that violate a unique index.
    #[serde(default = "default_true")]
    pub enforce_unique_indexes: bool,

    /// Assign a random `_id` to documents inserted without one.
    #[serde(default = "default_true")]
    pub generate_ids: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            enforce_unique_indexes: true,
            generate_ids: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Collection {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// A document store that lives entirely in process memory.
///
/// # Example
///
/// ```
/// use helios_tenancy::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// assert!(store.collection_names().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: MemoryStoreConfig,
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    /// Creates an empty store with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given configuration.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }

    /// Returns a snapshot of every document in `collection`.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Returns the names of all collections that have been written to.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Collection {
    fn matching(&self, filter: &Document, sort: Option<&Document>) -> StoreResult<Vec<usize>> {
        let mut indices = Vec::new();
        for (idx, doc) in self.documents.iter().enumerate() {
            if matches(doc, filter)? {
                indices.push(idx);
            }
        }
        if let Some(sort) = sort {
            indices.sort_by(|&a, &b| compare_documents(&self.documents[a], &self.documents[b], sort));
        }
        Ok(indices)
    }

    fn check_unique(
        &self,
        name: &str,
        config: &MemoryStoreConfig,
        candidate: &Document,
        replacing: Option<usize>,
    ) -> StoreResult<()> {
        if !config.enforce_unique_indexes {
            return Ok(());
        }
        for index in self.indexes.iter().filter(|i| i.is_unique()) {
            if !index_applies(index, candidate)? {
                continue;
            }
            let key = index_key(index, candidate);
            for (idx, other) in self.documents.iter().enumerate() {
                if Some(idx) == replacing || !index_applies(index, other)? {
                    continue;
                }
                let other_key = index_key(index, other);
                if key.iter().zip(&other_key).all(|(a, b)| values_equal(a, b)) {
                    return Err(StoreError::DuplicateKey {
                        collection: name.to_string(),
                        index: index.name(),
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, config: &MemoryStoreConfig, mut doc: Document) -> StoreResult<Document> {
        if config.generate_ids && !doc.contains_key("_id") {
            doc.insert("_id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        self.check_unique(name, config, &doc, None)?;
        self.documents.push(doc.clone());
        Ok(doc)
    }

    fn replace_at(&mut self, name: &str, config: &MemoryStoreConfig, idx: usize, next: Document) -> StoreResult<bool> {
        if self.documents[idx] == next {
            return Ok(false);
        }
        self.check_unique(name, config, &next, Some(idx))?;
        self.documents[idx] = next;
        Ok(true)
    }

    fn update(
        &mut self,
        name: &str,
        config: &MemoryStoreConfig,
        filter: &Document,
        update: &Document,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        check_update_shape(update, options.replace)?;
        let mut targets = self.matching(filter, None)?;
        if !options.multi {
            targets.truncate(1);
        }

        let mut result = UpdateResult::default();
        if targets.is_empty() {
            if options.upsert {
                let seed = upsert_document(filter, update, options.replace)?;
                let inserted = self.insert(name, config, seed)?;
                result.upserted_id = inserted.get("_id").cloned();
            }
            return Ok(result);
        }

        for idx in targets {
            result.matched_count += 1;
            let next = modified(&self.documents[idx], update, options.replace)?;
            if self.replace_at(name, config, idx, next)? {
                result.modified_count += 1;
            }
        }
        Ok(result)
    }

    fn delete(&mut self, filter: &Document, multi: bool) -> StoreResult<u64> {
        let mut targets = self.matching(filter, None)?;
        if !multi {
            targets.truncate(1);
        }
        targets.sort_unstable();
        for idx in targets.iter().rev() {
            self.documents.remove(*idx);
        }
        Ok(targets.len() as u64)
    }
}

fn index_applies(index: &IndexSpec, doc: &Document) -> StoreResult<bool> {
    if let Some(partial) = &index.options.partial_filter_expression {
        if !matches(doc, partial)? {
            return Ok(false);
        }
    }
    if index.options.sparse == Some(true) {
        return Ok(index.keys.iter().any(|(field, _)| get_path(doc, field).is_some()));
    }
    Ok(true)
}

fn index_key(index: &IndexSpec, doc: &Document) -> Vec<Value> {
    index
        .keys
        .iter()
        .map(|(field, _)| get_path(doc, field).cloned().unwrap_or(Value::Null))
        .collect()
}

fn check_update_shape(update: &Document, replace: bool) -> StoreResult<()> {
    let has_operators = update.keys().any(|k| k.starts_with('$'));
    if replace && has_operators {
        return Err(malformed("update", "replacement document must not contain operators"));
    }
    if !replace && !update.is_empty() && !is_operator_document(update) {
        return Err(malformed("update", "update document requires atomic operators"));
    }
    Ok(())
}

fn modified(existing: &Document, update: &Document, replace: bool) -> StoreResult<Document> {
    if replace {
        let mut next = update.clone();
        if let Some(id) = existing.get("_id") {
            next.insert("_id".to_string(), id.clone());
        }
        Ok(next)
    } else {
        let mut next = existing.clone();
        apply_update(&mut next, update, false)?;
        Ok(next)
    }
}

fn upsert_document(filter: &Document, update: &Document, replace: bool) -> StoreResult<Document> {
    if replace {
        return Ok(update.clone());
    }
    let mut seed = seed_from_filter(filter)?;
    apply_update(&mut seed, update, true)?;
    Ok(seed)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.indexes.iter().any(|i| i.keys == index.keys) {
            return Ok(());
        }
        if self.config.enforce_unique_indexes && index.is_unique() {
            let mut seen = Collection {
                documents: Vec::new(),
                indexes: vec![index.clone()],
            };
            for doc in &coll.documents {
                seen.check_unique(collection, &self.config, doc, None)?;
                seen.documents.push(doc.clone());
            }
        }
        tracing::debug!(collection, index = %index.name(), "memory store index created");
        coll.indexes.push(index.clone());
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
        options: &InsertManyOptions,
    ) -> StoreResult<Vec<Document>> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        let mut staged = coll.clone();
        let mut inserted = Vec::with_capacity(documents.len());
        let mut first_error = None;
        for doc in documents {
            match staged.insert(collection, &self.config, doc) {
                Ok(doc) => inserted.push(doc),
                Err(err) if options.ordered => return Err(err),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }
        *coll = staged;
        Ok(inserted)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
        options: &FindOptions,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let Some(coll) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let indices = coll.matching(filter, options.sort.as_ref())?;
        Ok(indices
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|idx| coll.documents[idx].clone())
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64> {
        let collections = self.collections.read();
        match collections.get(collection) {
            Some(coll) => Ok(coll.matching(filter, None)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
        options: &UpdateOptions,
    ) -> StoreResult<UpdateResult> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        let mut staged = coll.clone();
        let result = staged.update(collection, &self.config, filter, update, options)?;
        *coll = staged;
        Ok(result)
    }

    async fn find_one_and_modify(
        &self,
        collection: &str,
        filter: &Document,
        modification: &Modification,
        options: &FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        let target = coll.matching(filter, options.sort.as_ref())?.into_iter().next();

        let (update, replace) = match modification {
            Modification::Delete => {
                return Ok(target.map(|idx| coll.documents.remove(idx)));
            }
            Modification::Update(update) => (update, false),
            Modification::Replace(replacement) => (replacement, true),
        };
        check_update_shape(update, replace)?;

        match target {
            None if options.upsert => {
                let seed = upsert_document(filter, update, replace)?;
                let inserted = coll.insert(collection, &self.config, seed)?;
                Ok(options.return_new.then_some(inserted))
            }
            None => Ok(None),
            Some(idx) => {
                let before = coll.documents[idx].clone();
                let next = modified(&before, update, replace)?;
                coll.replace_at(collection, &self.config, idx, next.clone())?;
                Ok(Some(if options.return_new { next } else { before }))
            }
        }
    }

    async fn delete(
        &self,
        collection: &str,
        filter: &Document,
        multi: bool,
    ) -> StoreResult<DeleteResult> {
        let mut collections = self.collections.write();
        let Some(coll) = collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        let deleted_count = coll.delete(filter, multi)?;
        Ok(DeleteResult { deleted_count })
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Document>> {
        let documents = self.documents(collection);
        pipeline::run(documents, pipeline)
    }

    async fn bulk_write(
        &self,
        collection: &str,
        operations: &[BulkWriteOp],
        _options: &BulkWriteOptions,
    ) -> StoreResult<BulkWriteResult> {
        let mut collections = self.collections.write();
        let coll = collections.entry(collection.to_string()).or_default();
        // The batch is applied to a copy and committed only if every operation succeeds.
        let mut staged = coll.clone();
        let mut result = BulkWriteResult::default();

        for op in operations {
            match op {
                BulkWriteOp::InsertOne(model) => {
                    let doc = staged.insert(collection, &self.config, model.document.clone())?;
                    result.inserted_count += 1;
                    result
                        .inserted_ids
                        .push(doc.get("_id").cloned().unwrap_or(Value::Null));
                }
                BulkWriteOp::UpdateOne(model) | BulkWriteOp::UpdateMany(model) => {
                    let options = UpdateOptions {
                        multi: matches!(op, BulkWriteOp::UpdateMany(_)),
                        upsert: op.upsert(),
                        replace: false,
                    };
                    let outcome =
                        staged.update(collection, &self.config, &model.filter, &model.update, &options)?;
                    merge_update(&mut result, outcome);
                }
                BulkWriteOp::ReplaceOne(model) => {
                    let options = UpdateOptions {
                        multi: false,
                        upsert: op.upsert(),
                        replace: true,
                    };
                    let outcome = staged.update(
                        collection,
                        &self.config,
                        &model.filter,
                        &model.replacement,
                        &options,
                    )?;
                    merge_update(&mut result, outcome);
                }
                BulkWriteOp::DeleteOne(model) => {
                    result.deleted_count += staged.delete(&model.filter, false)?;
                }
                BulkWriteOp::DeleteMany(model) => {
                    result.deleted_count += staged.delete(&model.filter, true)?;
                }
                BulkWriteOp::Other(value) => {
                    let operator = value
                        .as_object()
                        .and_then(|o| o.keys().next().cloned())
                        .unwrap_or_else(|| "unknown".to_string());
                    return Err(StoreError::UnsupportedOperator { operator });
                }
            }
        }

        *coll = staged;
        Ok(result)
    }
}

fn merge_update(result: &mut BulkWriteResult, outcome: UpdateResult) {
    result.matched_count += outcome.matched_count;
    result.modified_count += outcome.modified_count;
    if outcome.upserted_id.is_some() {
        result.upserted_count += 1;
    }
}
