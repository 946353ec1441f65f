//! Models: compiled schemas bound to a collection.
//!
//! A [`Model`] is a cheap, clonable handle. Root models are created by
//! [`Connection::register`]; bound models are created by the dimension
//! accessors ([`Model::by_tenant`], [`Model::by_dimension`],
//! [`Model::call_accessor`]) and share the root's schema while carrying one
//! [`Binding`] per bound dimension.
//!
//! Every read and write goes through a [`Query`] (so the schema's pre hooks
//! see it) or through one of the batch operations, which stamp the bound
//! ids themselves before their single store call.

mod args;
mod callback;
mod connection;
mod document;
mod query;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::api::{
    AggregateArg, Binding, Db, parse_aggregate_arguments, resolve_accessor,
};
use crate::dimension::{
    DEFAULT_DIMENSION, DimensionId, DimensionOptions, DimensionRegistry, DimensionSubject,
};
use crate::error::{ConfigError, TenancyResult, ValidationError};
use crate::schema::{IndexSpec, Schema, StaticMethod};
use crate::store::{
    BulkWriteOp, BulkWriteOptions, BulkWriteResult, DeleteResult, Document, DocumentStore,
    InsertManyOptions,
};

pub use args::{InsertDocs, RemoveArgs, into_document};
pub use callback::{Callback, callback};
pub(crate) use callback::settle;
pub use connection::{Connection, WeakConnection};
pub use document::DocumentInstance;
pub(crate) use query::cast_update;
pub use query::{Query, QueryOp, QueryOptions, QueryOutcome};

/// Field holding the discriminator value of documents stored by a
/// discriminator model.
pub const DISCRIMINATOR_KEY: &str = "__t";

/// A compiled model.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

struct ModelInner {
    name: String,
    schema: Arc<Schema>,
    collection: String,
    store: Arc<dyn DocumentStore>,
    connection: WeakConnection,
    discriminator: Option<String>,
    discriminators: RwLock<BTreeMap<String, Model>>,
    dimensions: DimensionRegistry,
    binding: Option<Binding>,
    statics: BTreeMap<String, StaticMethod>,
}

impl Model {
    pub(crate) fn compile(
        name: &str,
        schema: Arc<Schema>,
        collection: &str,
        store: Arc<dyn DocumentStore>,
        connection: WeakConnection,
        discriminator: Option<String>,
    ) -> Self {
        let dimensions = schema.dimensions().clone();
        let statics = schema.statics().clone();
        Self {
            inner: Arc::new(ModelInner {
                name: name.to_string(),
                schema,
                collection: collection.to_string(),
                store,
                connection,
                discriminator,
                discriminators: RwLock::new(BTreeMap::new()),
                dimensions,
                binding: None,
                statics,
            }),
        }
    }

    /// Creates a model sharing `base`'s schema and store, bound through
    /// `binding`.
    pub(crate) fn derive(
        base: &Model,
        collection: String,
        dimensions: DimensionRegistry,
        binding: Binding,
        statics: BTreeMap<String, StaticMethod>,
    ) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                name: base.inner.name.clone(),
                schema: base.inner.schema.clone(),
                collection,
                store: base.inner.store.clone(),
                connection: base.inner.connection.clone(),
                discriminator: base.inner.discriminator.clone(),
                discriminators: RwLock::new(BTreeMap::new()),
                dimensions,
                binding: Some(binding),
                statics,
            }),
        }
    }

    /// Returns the model name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the collection documents are stored in.
    pub fn collection_name(&self) -> &str {
        &self.inner.collection
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Returns the document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    /// Returns the connection the model was registered on.
    pub fn connection(&self) -> TenancyResult<Connection> {
        self.inner.connection.upgrade().ok_or_else(|| {
            ConfigError::ConnectionClosed {
                model: self.inner.name.clone(),
            }
            .into()
        })
    }

    /// Returns the handle used to reach other models.
    ///
    /// Bound models answer with a dimension-aware db that binds compatible
    /// models to the same id.
    pub fn db(&self) -> TenancyResult<Db> {
        match &self.inner.binding {
            Some(binding) => Ok(Db::DimensionAware(binding.db().clone())),
            None => Ok(Db::Connection(self.connection()?)),
        }
    }

    /// Returns `true` if the model is bound to at least one dimension id.
    pub fn is_bound(&self) -> bool {
        self.inner.binding.is_some()
    }

    /// Returns the most recent binding.
    pub fn binding(&self) -> Option<&Binding> {
        self.inner.binding.as_ref()
    }

    /// Returns every binding, most recent first.
    pub fn bindings(&self) -> Vec<&Binding> {
        let mut bindings = Vec::new();
        let mut current = self;
        while let Some(binding) = current.inner.binding.as_ref() {
            bindings.push(binding);
            current = binding.base();
        }
        bindings
    }

    /// Returns the unbound model this model was derived from.
    pub fn root(&self) -> Model {
        let mut current = self;
        while let Some(binding) = current.inner.binding.as_ref() {
            current = binding.base();
        }
        current.clone()
    }

    /// Returns `true` if both handles refer to the same model.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// Returns the id this model is bound to for `dimension`.
    pub fn dimension_id(&self, dimension: &str) -> Option<DimensionId> {
        self.inner
            .dimensions
            .get(dimension)
            .and_then(|entry| entry.dimension_id())
            .cloned()
    }

    /// Calls a dimension id getter by its configured name
    /// (`getTenantId` by default).
    pub fn call_getter(&self, name: &str) -> TenancyResult<Option<DimensionId>> {
        let options = self
            .schema()
            .getter(name)
            .ok_or_else(|| self.unknown_method(name))?;
        Ok(self.dimension_id(&options.dimension))
    }

    /// Returns the resolved plugin options for `dimension`.
    pub fn tenancy_options(&self, dimension: &str) -> Option<Arc<DimensionOptions>> {
        self.schema().accessor_for_dimension(dimension).cloned()
    }

    /// Returns the statics callable on this model.
    pub fn statics(&self) -> &BTreeMap<String, StaticMethod> {
        &self.inner.statics
    }

    /// Calls a registered static.
    pub fn call_static(&self, name: &str, args: Value) -> TenancyResult<Query> {
        let method = self.inner.statics.get(name).ok_or_else(|| ConfigError::UnknownStatic {
            name: name.to_string(),
            model: self.inner.name.clone(),
        })?;
        method(self, args)
    }

    pub(crate) fn discriminator_value(&self) -> Option<&str> {
        self.inner.discriminator.as_deref()
    }

    /// Declares a discriminator: a model stored in the same collection whose
    /// schema extends this one. Its documents carry `__t: name`.
    pub fn discriminator(&self, name: &str, schema: Schema) -> TenancyResult<Model> {
        if self.is_bound() {
            return Err(ValidationError::InvalidArguments {
                operation: "discriminator".to_string(),
                message: "discriminators must be declared on an unbound model".to_string(),
            }
            .into());
        }
        let connection = self.connection()?;
        let model = Model::compile(
            name,
            Arc::new(self.schema().merged_with(&schema)),
            self.collection_name(),
            self.inner.store.clone(),
            self.inner.connection.clone(),
            Some(name.to_string()),
        );
        connection.insert_model(name, model.clone())?;
        self.insert_discriminator(name, model.clone());
        tracing::debug!(model = %self.name(), discriminator = name, "registered discriminator");
        Ok(model)
    }

    pub(crate) fn insert_discriminator(&self, name: &str, model: Model) {
        self.inner
            .discriminators
            .write()
            .insert(name.to_string(), model);
    }

    /// Returns the discriminator model called `name`.
    pub fn get_discriminator(&self, name: &str) -> Option<Model> {
        self.inner.discriminators.read().get(name).cloned()
    }

    /// Returns every discriminator model, keyed by name.
    pub fn discriminators(&self) -> BTreeMap<String, Model> {
        self.inner.discriminators.read().clone()
    }

    /// Returns this model bound to `dimension_id` for `dimension`.
    ///
    /// Bound models are cached per connection: repeated calls with the same
    /// arguments return the same model.
    pub fn by_dimension(
        &self,
        dimension: &str,
        dimension_id: impl Into<DimensionId>,
    ) -> TenancyResult<Model> {
        let options = self
            .schema()
            .accessor_for_dimension(dimension)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDimension {
                dimension: dimension.to_string(),
                model: self.inner.name.clone(),
            })?;
        resolve_accessor(self, &options, dimension_id.into())
    }

    /// Returns this model bound to a tenant id.
    pub fn by_tenant(&self, tenant_id: impl Into<DimensionId>) -> TenancyResult<Model> {
        self.by_dimension(DEFAULT_DIMENSION, tenant_id)
    }

    /// Calls an accessor by its configured name (`byTenant` by default).
    pub fn call_accessor(
        &self,
        name: &str,
        dimension_id: impl Into<DimensionId>,
    ) -> TenancyResult<Model> {
        let options = self
            .schema()
            .accessor(name)
            .cloned()
            .ok_or_else(|| self.unknown_method(name))?;
        resolve_accessor(self, &options, dimension_id.into())
    }

    /// Returns this model without its binding for `dimension`, keeping the
    /// bindings of every other dimension.
    pub(crate) fn without_dimension(&self, dimension: &str) -> TenancyResult<Model> {
        if self.dimension_id(dimension).is_none() {
            return Ok(self.clone());
        }
        let mut model = self.root();
        for binding in self.bindings().into_iter().rev() {
            if binding.options().dimension != dimension {
                model = resolve_accessor(&model, binding.options(), binding.dimension_id().clone())?;
            }
        }
        Ok(model)
    }

    fn unknown_method(&self, name: &str) -> ConfigError {
        ConfigError::UnknownMethod {
            method: name.to_string(),
            model: self.inner.name.clone(),
        }
    }

    fn query(&self, op: QueryOp, conditions: Value) -> Query {
        Query::for_model(self, op, conditions)
    }

    /// Finds matching documents.
    pub fn find(&self, conditions: Value) -> Query {
        self.query(QueryOp::Find, conditions)
    }

    /// Finds the first matching document.
    pub fn find_one(&self, conditions: Value) -> Query {
        self.query(QueryOp::FindOne, conditions)
    }

    /// Counts matching documents.
    pub fn count(&self, conditions: Value) -> Query {
        self.query(QueryOp::Count, conditions)
    }

    /// Updates the first matching document, or all of them with
    /// [`Query::multi`].
    pub fn update(&self, conditions: Value, update: Value) -> Query {
        self.query(QueryOp::Update, conditions).with_update(update)
    }

    /// Updates the first matching document.
    pub fn update_one(&self, conditions: Value, update: Value) -> Query {
        self.query(QueryOp::UpdateOne, conditions).with_update(update)
    }

    /// Updates every matching document.
    pub fn update_many(&self, conditions: Value, update: Value) -> Query {
        self.query(QueryOp::UpdateMany, conditions).with_update(update)
    }

    /// Replaces the first matching document.
    pub fn replace_one(&self, conditions: Value, replacement: Value) -> Query {
        self.query(QueryOp::ReplaceOne, conditions)
            .with_update(replacement)
    }

    /// Finds one document and updates it.
    pub fn find_one_and_update(&self, conditions: Value, update: Value) -> Query {
        self.query(QueryOp::FindOneAndUpdate, conditions)
            .with_update(update)
    }

    /// Finds one document and replaces it.
    pub fn find_one_and_replace(&self, conditions: Value, replacement: Value) -> Query {
        self.query(QueryOp::FindOneAndReplace, conditions)
            .with_update(replacement)
    }

    /// Finds one document and deletes it.
    pub fn find_one_and_delete(&self, conditions: Value) -> Query {
        self.query(QueryOp::FindOneAndDelete, conditions)
    }

    /// Finds one document and removes it.
    pub fn find_one_and_remove(&self, conditions: Value) -> Query {
        self.query(QueryOp::FindOneAndRemove, conditions)
    }

    fn stamp(&self, doc: &mut Document) {
        for binding in self.bindings() {
            binding.stamp(doc);
        }
    }

    async fn run_delete(
        &self,
        op: QueryOp,
        conditions: Option<Value>,
        options: Option<QueryOptions>,
    ) -> TenancyResult<DeleteResult> {
        let conditions = match conditions {
            Some(conditions) => {
                let mut conditions = into_document(conditions, op.as_str())?;
                self.stamp(&mut conditions);
                Value::Object(conditions)
            }
            None => Value::Null,
        };
        let mut query = self.query(op, conditions);
        if let Some(options) = options {
            query = query.with_options(options);
        }
        let outcome = query.exec().await?;
        Ok(outcome.delete_result().cloned().unwrap_or_default())
    }

    /// Deletes the first matching document.
    pub async fn delete_one(
        &self,
        conditions: Value,
        callback: Option<Callback<DeleteResult>>,
    ) -> TenancyResult<DeleteResult> {
        let result = self.run_delete(QueryOp::DeleteOne, Some(conditions), None).await;
        settle(result, callback)
    }

    /// Deletes every matching document.
    pub async fn delete_many(
        &self,
        conditions: Value,
        options: Option<QueryOptions>,
        callback: Option<Callback<DeleteResult>>,
    ) -> TenancyResult<DeleteResult> {
        let result = self
            .run_delete(QueryOp::DeleteMany, Some(conditions), options)
            .await;
        settle(result, callback)
    }

    /// Removes matching documents.
    ///
    /// Accepts no arguments, a callback alone, conditions, or conditions and
    /// a callback.
    pub async fn remove(&self, args: RemoveArgs) -> TenancyResult<DeleteResult> {
        let (conditions, callback) = args.into_parts();
        let result = self.run_delete(QueryOp::Remove, conditions, None).await;
        settle(result, callback)
    }

    /// Builds a new, unsaved document.
    pub fn new_document(&self, data: Value) -> TenancyResult<DocumentInstance> {
        let data = into_document(data, "new")?;
        Ok(DocumentInstance::new(self.clone(), data))
    }

    /// Builds and saves one or more documents.
    pub async fn create(&self, docs: impl Into<InsertDocs>) -> TenancyResult<Vec<DocumentInstance>> {
        let docs = docs.into().into_documents("create")?;
        let mut created = Vec::with_capacity(docs.len());
        for data in docs {
            let mut doc = DocumentInstance::new(self.clone(), data);
            doc.save().await?;
            created.push(doc);
        }
        Ok(created)
    }

    /// Inserts one or more documents in a single store call.
    ///
    /// Each document is stamped with every bound id and validated first.
    /// The stored documents come back as instances of this model.
    pub async fn insert_many(
        &self,
        docs: impl Into<InsertDocs>,
        options: Option<InsertManyOptions>,
        callback: Option<Callback<Vec<DocumentInstance>>>,
    ) -> TenancyResult<Vec<DocumentInstance>> {
        let docs = docs.into();
        let result: TenancyResult<Vec<DocumentInstance>> = async {
            let mut prepared = Vec::new();
            for mut data in docs.into_documents("insertMany")? {
                self.stamp(&mut data);
                let mut doc = DocumentInstance::new(self.clone(), data);
                doc.validate()?;
                prepared.push(doc.into_data());
            }
            let stored = self
                .store()
                .insert_many(
                    self.collection_name(),
                    prepared,
                    &options.unwrap_or_default(),
                )
                .await?;
            Ok(stored
                .into_iter()
                .map(|data| DocumentInstance::hydrate(self.clone(), data))
                .collect())
        }
        .await;
        settle(result, callback)
    }

    /// Runs an aggregation pipeline.
    ///
    /// Bound models prepend one `$match` per bound dimension. A callback, if
    /// any, must be the last argument.
    pub async fn aggregate(&self, args: Vec<AggregateArg>) -> TenancyResult<Vec<Document>> {
        let parsed = parse_aggregate_arguments(args)?;
        let mut pipeline = parsed.pipeline;
        for binding in self.bindings() {
            binding.prepend_match(&mut pipeline);
        }
        if let Some(tag) = self.discriminator_value() {
            pipeline.insert(0, json!({"$match": {DISCRIMINATOR_KEY: tag}}));
        }
        let result = self
            .store()
            .aggregate(self.collection_name(), &pipeline)
            .await
            .map_err(Into::into);
        settle(result, parsed.callback)
    }

    /// Executes a batch of writes in a single store call.
    ///
    /// Plain update fields are cast into `$set` first; every operation is
    /// then patched for each bound dimension. A rejected operation fails the
    /// whole batch before anything is written.
    pub async fn bulk_write(
        &self,
        operations: Vec<BulkWriteOp>,
        options: Option<BulkWriteOptions>,
        callback: Option<Callback<BulkWriteResult>>,
    ) -> TenancyResult<BulkWriteResult> {
        let result: TenancyResult<BulkWriteResult> = async {
            let mut operations: Vec<BulkWriteOp> =
                operations.into_iter().map(cast_bulk_update).collect();
            for binding in self.bindings() {
                operations = binding.patch_bulk_write(operations)?;
            }
            Ok(self
                .store()
                .bulk_write(
                    self.collection_name(),
                    &operations,
                    &options.unwrap_or_default(),
                )
                .await?)
        }
        .await;
        settle(result, callback)
    }

    /// Creates every index the schema declares.
    pub async fn init(&self) -> TenancyResult<()> {
        for index in self.schema().indexes() {
            self.store()
                .create_index(self.collection_name(), &index)
                .await?;
        }
        Ok(())
    }

    /// Lists the indexes present on the model's collection.
    pub async fn list_indexes(&self) -> TenancyResult<Vec<IndexSpec>> {
        Ok(self.store().list_indexes(self.collection_name()).await?)
    }
}

fn cast_bulk_update(operation: BulkWriteOp) -> BulkWriteOp {
    match operation {
        BulkWriteOp::UpdateOne(mut model) => {
            model.update = cast_update(model.update);
            BulkWriteOp::UpdateOne(model)
        }
        BulkWriteOp::UpdateMany(mut model) => {
            model.update = cast_update(model.update);
            BulkWriteOp::UpdateMany(model)
        }
        other => other,
    }
}

impl DimensionSubject for Model {
    fn dimension_registry(&self) -> &DimensionRegistry {
        &self.inner.dimensions
    }

    fn subject_name(&self) -> Option<&str> {
        Some(&self.inner.name)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound: Vec<String> = self
            .bindings()
            .iter()
            .map(|b| format!("{}={}", b.options().dimension, b.dimension_id()))
            .collect();
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("collection", &self.inner.collection)
            .field("discriminator", &self.inner.discriminator)
            .field("bound", &bound)
            .finish()
    }
}
