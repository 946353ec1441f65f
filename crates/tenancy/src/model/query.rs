//! Queries.
//!
//! A [`Query`] is built by a model operation, passes through the pre hooks
//! registered on the model's schema for its [`QueryOp`], and ends in a single
//! store call. Hooks see the query after every argument has been collected,
//! so they can rewrite conditions and updates before anything is sent.

use std::fmt;

use serde_json::{Value, json};

use crate::error::{TenancyError, TenancyResult, ValidationError};
use crate::store::{
    DeleteResult, Document, FindAndModifyOptions, FindOptions, Modification, UpdateOptions,
    UpdateResult,
};

use super::args::into_document;
use super::{DISCRIMINATOR_KEY, DocumentInstance, Model};

/// The query operations that accept pre hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOp {
    /// Count matching documents.
    Count,
    /// Delete every matching document.
    DeleteMany,
    /// Delete the first matching document.
    DeleteOne,
    /// Find matching documents.
    Find,
    /// Find the first matching document.
    FindOne,
    /// Find and delete one document.
    FindOneAndDelete,
    /// Find and remove one document.
    FindOneAndRemove,
    /// Find and replace one document.
    FindOneAndReplace,
    /// Find and update one document.
    FindOneAndUpdate,
    /// Remove matching documents.
    Remove,
    /// Replace the first matching document.
    ReplaceOne,
    /// Update the first (or, with `multi`, every) matching document.
    Update,
    /// Update the first matching document.
    UpdateOne,
    /// Update every matching document.
    UpdateMany,
}

impl QueryOp {
    /// Every operation, in alphabetical order of the wire name.
    pub const ALL: [QueryOp; 14] = [
        QueryOp::Count,
        QueryOp::DeleteMany,
        QueryOp::DeleteOne,
        QueryOp::Find,
        QueryOp::FindOne,
        QueryOp::FindOneAndDelete,
        QueryOp::FindOneAndRemove,
        QueryOp::FindOneAndReplace,
        QueryOp::FindOneAndUpdate,
        QueryOp::Remove,
        QueryOp::ReplaceOne,
        QueryOp::Update,
        QueryOp::UpdateOne,
        QueryOp::UpdateMany,
    ];

    /// Returns the wire name (`findOneAndUpdate`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOp::Count => "count",
            QueryOp::DeleteMany => "deleteMany",
            QueryOp::DeleteOne => "deleteOne",
            QueryOp::Find => "find",
            QueryOp::FindOne => "findOne",
            QueryOp::FindOneAndDelete => "findOneAndDelete",
            QueryOp::FindOneAndRemove => "findOneAndRemove",
            QueryOp::FindOneAndReplace => "findOneAndReplace",
            QueryOp::FindOneAndUpdate => "findOneAndUpdate",
            QueryOp::Remove => "remove",
            QueryOp::ReplaceOne => "replaceOne",
            QueryOp::Update => "update",
            QueryOp::UpdateOne => "updateOne",
            QueryOp::UpdateMany => "updateMany",
        }
    }

    /// Returns `true` for operations whose payload replaces the document.
    pub fn is_replacement(&self) -> bool {
        matches!(self, QueryOp::FindOneAndReplace | QueryOp::ReplaceOne)
    }

    /// Returns `true` for operations carrying an update or replacement.
    pub fn has_update(&self) -> bool {
        matches!(
            self,
            QueryOp::FindOneAndReplace
                | QueryOp::FindOneAndUpdate
                | QueryOp::ReplaceOne
                | QueryOp::Update
                | QueryOp::UpdateOne
                | QueryOp::UpdateMany
        )
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Treat the update payload as a full replacement.
    pub overwrite: bool,
    /// Insert a document when nothing matches.
    pub upsert: bool,
    /// Let `update` touch every matching document.
    pub multi: bool,
    /// Return the modified document from find-and-modify operations.
    pub new: bool,
    /// Sort specification.
    pub sort: Option<Document>,
    /// Documents to skip.
    pub skip: Option<usize>,
    /// Maximum documents to return.
    pub limit: Option<usize>,
}

/// Result of executing a query.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Documents returned by `find`.
    Documents(Vec<DocumentInstance>),
    /// Document returned by `findOne` and find-and-modify operations.
    Document(Option<DocumentInstance>),
    /// Count returned by `count`.
    Count(u64),
    /// Result of an update or replacement.
    Updated(UpdateResult),
    /// Result of a delete.
    Deleted(DeleteResult),
}

impl QueryOutcome {
    /// Returns the documents, treating a single document as a list of one.
    pub fn documents(self) -> Vec<DocumentInstance> {
        match self {
            QueryOutcome::Documents(docs) => docs,
            QueryOutcome::Document(doc) => doc.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the single document, or the first of a list.
    pub fn document(self) -> Option<DocumentInstance> {
        match self {
            QueryOutcome::Documents(docs) => docs.into_iter().next(),
            QueryOutcome::Document(doc) => doc,
            _ => None,
        }
    }

    /// Returns the count of a `count` query.
    pub fn count(&self) -> Option<u64> {
        match self {
            QueryOutcome::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the update result of an update query.
    pub fn update_result(&self) -> Option<&UpdateResult> {
        match self {
            QueryOutcome::Updated(result) => Some(result),
            _ => None,
        }
    }

    /// Returns the delete result of a delete query.
    pub fn delete_result(&self) -> Option<&DeleteResult> {
        match self {
            QueryOutcome::Deleted(result) => Some(result),
            _ => None,
        }
    }

    fn instances_mut(&mut self) -> &mut [DocumentInstance] {
        match self {
            QueryOutcome::Documents(docs) => docs.as_mut_slice(),
            QueryOutcome::Document(Some(doc)) => std::slice::from_mut(doc),
            _ => &mut [],
        }
    }
}

/// A query in flight.
pub struct Query {
    op: QueryOp,
    model: Option<Model>,
    conditions: Document,
    update: Option<Document>,
    options: QueryOptions,
    populate: Vec<String>,
    error: Option<TenancyError>,
}

impl Query {
    /// Creates a query that is not attached to any model.
    ///
    /// Detached queries can be passed through hooks but not executed.
    pub fn new(op: QueryOp) -> Self {
        Self {
            op,
            model: None,
            conditions: Document::new(),
            update: None,
            options: QueryOptions::default(),
            populate: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn for_model(model: &Model, op: QueryOp, conditions: Value) -> Self {
        let mut query = Query::new(op);
        query.model = Some(model.clone());
        match into_document(conditions, op.as_str()) {
            Ok(conditions) => query.conditions = conditions,
            Err(err) => query.error = Some(err.into()),
        }
        if let Some(tag) = model.discriminator_value() {
            query
                .conditions
                .insert(DISCRIMINATOR_KEY.to_string(), Value::String(tag.to_string()));
        }
        query
    }

    /// Attaches the query to `model`.
    pub fn with_model(mut self, model: &Model) -> Self {
        self.model = Some(model.clone());
        self
    }

    /// Replaces the conditions.
    pub fn with_conditions(mut self, conditions: Document) -> Self {
        self.conditions = conditions;
        self
    }

    /// Sets the update or replacement payload.
    pub fn with_update(mut self, update: Value) -> Self {
        match into_document(update, self.op.as_str()) {
            Ok(update) => self.update = Some(update),
            Err(err) => {
                self.error.get_or_insert(err.into());
            }
        }
        self
    }

    /// Replaces the options.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Treats the update payload as a full replacement.
    pub fn overwrite(mut self) -> Self {
        self.options.overwrite = true;
        self
    }

    /// Inserts a document when nothing matches.
    pub fn upsert(mut self) -> Self {
        self.options.upsert = true;
        self
    }

    /// Lets `update` touch every matching document.
    pub fn multi(mut self) -> Self {
        self.options.multi = true;
        self
    }

    /// Returns the modified document from find-and-modify operations.
    pub fn return_new(mut self) -> Self {
        self.options.new = true;
        self
    }

    /// Sorts results by a `{field: 1 | -1}` specification.
    pub fn sort(mut self, sort: Value) -> Self {
        match into_document(sort, "sort") {
            Ok(sort) => self.options.sort = Some(sort),
            Err(err) => {
                self.error.get_or_insert(err.into());
            }
        }
        self
    }

    /// Skips the first `n` results.
    pub fn skip(mut self, n: usize) -> Self {
        self.options.skip = Some(n);
        self
    }

    /// Returns at most `n` results.
    pub fn limit(mut self, n: usize) -> Self {
        self.options.limit = Some(n);
        self
    }

    /// Replaces the referenced ids at `path` with the referenced documents.
    pub fn populate(mut self, path: impl Into<String>) -> Self {
        self.populate.push(path.into());
        self
    }

    /// Returns the operation.
    pub fn op(&self) -> QueryOp {
        self.op
    }

    /// Returns the model the query runs against.
    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// Returns the conditions.
    pub fn conditions(&self) -> &Document {
        &self.conditions
    }

    /// Returns the conditions for modification.
    pub fn conditions_mut(&mut self) -> &mut Document {
        &mut self.conditions
    }

    /// Returns the update or replacement payload.
    pub fn update(&self) -> Option<&Document> {
        self.update.as_ref()
    }

    /// Returns the update payload for modification.
    pub fn update_mut(&mut self) -> Option<&mut Document> {
        self.update.as_mut()
    }

    /// Returns the options.
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Returns the options for modification.
    pub fn options_mut(&mut self) -> &mut QueryOptions {
        &mut self.options
    }

    /// Runs the pre hooks of the model's schema on this query.
    pub fn run_hooks(&mut self) -> TenancyResult<()> {
        let Some(model) = self.model.clone() else {
            return Ok(());
        };
        for hook in model.schema().query_hooks(self.op) {
            hook(self)?;
        }
        Ok(())
    }

    /// Executes the query: pre hooks, one store call, then population.
    pub async fn exec(mut self) -> TenancyResult<QueryOutcome> {
        let populate = std::mem::take(&mut self.populate);
        let model = self.attached_model()?;
        let mut outcome = self.run().await?;
        for path in &populate {
            populate_path(&model, outcome.instances_mut(), path).await?;
        }
        Ok(outcome)
    }

    fn attached_model(&self) -> TenancyResult<Model> {
        self.model.clone().ok_or_else(|| {
            ValidationError::InvalidArguments {
                operation: self.op.as_str().to_string(),
                message: "query is not attached to a model".to_string(),
            }
            .into()
        })
    }

    async fn run(mut self) -> TenancyResult<QueryOutcome> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        let model = self.attached_model()?;
        self.run_hooks()?;

        let store = model.store();
        let collection = model.collection_name();
        let outcome = match self.op {
            QueryOp::Count => QueryOutcome::Count(store.count(collection, &self.conditions).await?),
            QueryOp::Find | QueryOp::FindOne => {
                let mut options = FindOptions {
                    sort: self.options.sort.clone(),
                    skip: self.options.skip,
                    limit: self.options.limit,
                };
                if self.op == QueryOp::FindOne {
                    options.limit = Some(1);
                }
                let docs = store.find(collection, &self.conditions, &options).await?;
                let docs: Vec<_> = docs
                    .into_iter()
                    .map(|doc| DocumentInstance::hydrate(model.clone(), doc))
                    .collect();
                if self.op == QueryOp::FindOne {
                    QueryOutcome::Document(docs.into_iter().next())
                } else {
                    QueryOutcome::Documents(docs)
                }
            }
            QueryOp::Update | QueryOp::UpdateOne | QueryOp::UpdateMany | QueryOp::ReplaceOne => {
                let (update, replace) = self.prepared_update();
                let options = UpdateOptions {
                    multi: self.op == QueryOp::UpdateMany
                        || (self.op == QueryOp::Update && self.options.multi),
                    upsert: self.options.upsert,
                    replace,
                };
                QueryOutcome::Updated(
                    store
                        .update(collection, &self.conditions, &update, &options)
                        .await?,
                )
            }
            QueryOp::FindOneAndUpdate | QueryOp::FindOneAndReplace => {
                let (update, replace) = self.prepared_update();
                let modification = if replace {
                    Modification::Replace(update)
                } else {
                    Modification::Update(update)
                };
                let doc = store
                    .find_one_and_modify(
                        collection,
                        &self.conditions,
                        &modification,
                        &self.modify_options(),
                    )
                    .await?;
                QueryOutcome::Document(doc.map(|doc| DocumentInstance::hydrate(model.clone(), doc)))
            }
            QueryOp::FindOneAndDelete | QueryOp::FindOneAndRemove => {
                let doc = store
                    .find_one_and_modify(
                        collection,
                        &self.conditions,
                        &Modification::Delete,
                        &self.modify_options(),
                    )
                    .await?;
                QueryOutcome::Document(doc.map(|doc| DocumentInstance::hydrate(model.clone(), doc)))
            }
            QueryOp::DeleteOne => {
                QueryOutcome::Deleted(store.delete(collection, &self.conditions, false).await?)
            }
            QueryOp::DeleteMany | QueryOp::Remove => {
                QueryOutcome::Deleted(store.delete(collection, &self.conditions, true).await?)
            }
        };
        Ok(outcome)
    }

    fn prepared_update(&self) -> (Document, bool) {
        let update = self.update.clone().unwrap_or_default();
        if self.op.is_replacement() || self.options.overwrite {
            (update, true)
        } else {
            (cast_update(update), false)
        }
    }

    fn modify_options(&self) -> FindAndModifyOptions {
        FindAndModifyOptions {
            sort: self.options.sort.clone(),
            upsert: self.options.upsert,
            return_new: self.options.new,
        }
    }
}

/// Moves top-level plain fields of an update into `$set`.
pub(crate) fn cast_update(update: Document) -> Document {
    let mut cast = Document::new();
    let mut plain = Document::new();
    for (key, value) in update {
        if key.starts_with('$') {
            cast.insert(key, value);
        } else {
            plain.insert(key, value);
        }
    }
    if !plain.is_empty() {
        match cast.get_mut("$set") {
            Some(Value::Object(set)) => set.extend(plain),
            _ => {
                cast.insert("$set".to_string(), Value::Object(plain));
            }
        }
    }
    cast
}

async fn populate_path(model: &Model, docs: &mut [DocumentInstance], path: &str) -> TenancyResult<()> {
    let reference = model
        .schema()
        .field(path)
        .and_then(|field| field.reference.clone())
        .ok_or_else(|| ValidationError::InvalidArguments {
            operation: "populate".to_string(),
            message: format!("path \"{path}\" does not reference a model"),
        })?;

    let ids: Vec<Value> = docs
        .iter()
        .filter_map(|doc| doc.get(path))
        .flat_map(|value| match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
        .filter(|id| !id.is_null())
        .collect();
    if ids.is_empty() {
        return Ok(());
    }

    let target = model.db()?.model(&reference)?;
    let found = Query::for_model(&target, QueryOp::Find, json!({"_id": {"$in": ids}}))
        .run()
        .await?
        .documents();
    tracing::trace!(
        model = %model.name(),
        path,
        reference = %reference,
        found = found.len(),
        "populated reference"
    );

    for doc in docs.iter_mut() {
        doc.resolve_population(path, &found);
    }
    Ok(())
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("op", &self.op)
            .field("model", &self.model.as_ref().map(Model::name))
            .field("conditions", &self.conditions)
            .field("update", &self.update)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_op_names() {
        assert_eq!(QueryOp::FindOneAndUpdate.as_str(), "findOneAndUpdate");
        assert_eq!(QueryOp::ALL.len(), 14);
        assert!(QueryOp::ReplaceOne.is_replacement());
        assert!(!QueryOp::UpdateOne.is_replacement());
        assert!(QueryOp::Update.has_update());
        assert!(!QueryOp::Find.has_update());
    }

    #[test]
    fn test_cast_update() {
        assert_eq!(
            Value::Object(cast_update(doc(json!({"a": 1, "$inc": {"n": 1}})))),
            json!({"$set": {"a": 1}, "$inc": {"n": 1}})
        );
        assert_eq!(
            Value::Object(cast_update(doc(json!({"a": 1, "$set": {"b": 2}})))),
            json!({"$set": {"a": 1, "b": 2}})
        );
        assert_eq!(
            Value::Object(cast_update(doc(json!({"$unset": {"a": ""}})))),
            json!({"$unset": {"a": ""}})
        );
    }

    #[test]
    fn test_detached_query_builders() {
        let query = Query::new(QueryOp::FindOneAndUpdate)
            .with_conditions(doc(json!({"k": 1})))
            .with_update(json!({"v": 2}))
            .upsert()
            .return_new()
            .sort(json!({"k": -1}))
            .limit(3);
        assert_eq!(query.conditions().get("k"), Some(&json!(1)));
        assert_eq!(query.update().and_then(|u| u.get("v")), Some(&json!(2)));
        assert!(query.options().upsert);
        assert!(query.options().new);
        assert_eq!(query.options().limit, Some(3));
        assert!(query.model().is_none());
    }

    #[tokio::test]
    async fn test_detached_query_cannot_execute() {
        let err = Query::new(QueryOp::Find).exec().await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_invalid_update_is_reported_on_exec() {
        let query = Query::new(QueryOp::UpdateOne).with_update(json!(5));
        assert!(query.update().is_none());
        let err = query.exec().await.unwrap_err();
        assert!(err.is_validation());
    }
}
