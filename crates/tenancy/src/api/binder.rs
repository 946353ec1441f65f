//! Model binding.
//!
//! [`bind`] derives a model pinned to one dimension id. The derived model
//! shares its base's schema and store and records a [`Binding`]; the model
//! operations consult the bindings to stamp conditions, documents, bulk
//! operations and aggregation pipelines.
//!
//! [`resolve_accessor`] is what every accessor (`by_tenant`, `by_dimension`,
//! `call_accessor`) ends in: it finds the live base model, then returns the
//! cached bound model or binds and caches a new one.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::dimension::{
    CollectionContext, DimensionEntry, DimensionId, DimensionOptions, DimensionSubject,
};
use crate::error::{TenancyResult, ValidationError};
use crate::model::Model;
use crate::store::{BulkWriteOp, Document};

use super::aware_db::DimensionAwareDb;
use super::bulk::modify_bulk_write_operations;
use super::cache::CacheKey;

/// Statics a bound model never inherits: the operations it overrides.
const RESERVED_STATICS: [&str; 7] = [
    "aggregate",
    "bulkWrite",
    "db",
    "deleteMany",
    "deleteOne",
    "insertMany",
    "remove",
];

/// One dimension a model is bound to.
#[derive(Debug, Clone)]
pub struct Binding {
    base: Model,
    dimension_id: DimensionId,
    options: Arc<DimensionOptions>,
    db: DimensionAwareDb,
}

impl Binding {
    /// Returns the model this binding was applied to.
    pub fn base(&self) -> &Model {
        &self.base
    }

    /// Returns the bound id.
    pub fn dimension_id(&self) -> &DimensionId {
        &self.dimension_id
    }

    /// Returns the options of the bound dimension.
    pub fn options(&self) -> &Arc<DimensionOptions> {
        &self.options
    }

    /// Returns the dimension-aware db of the bound model.
    pub fn db(&self) -> &DimensionAwareDb {
        &self.db
    }

    pub(crate) fn stamp(&self, doc: &mut Document) {
        doc.insert(
            self.options.dimension_id_key.clone(),
            self.dimension_id.as_value().clone(),
        );
    }

    pub(crate) fn prepend_match(&self, pipeline: &mut Vec<Value>) {
        let mut condition = Document::new();
        self.stamp(&mut condition);
        let mut stage = Document::new();
        stage.insert("$match".to_string(), Value::Object(condition));
        pipeline.insert(0, Value::Object(stage));
    }

    pub(crate) fn patch_bulk_write(
        &self,
        operations: Vec<BulkWriteOp>,
    ) -> Result<Vec<BulkWriteOp>, ValidationError> {
        modify_bulk_write_operations(operations, &self.options.dimension_id_key, &self.dimension_id)
    }
}

/// Derives a model from `base` bound to `dimension_id`.
///
/// The bound model:
///
/// - records the id in its dimension registry, replacing any earlier entry
///   for the dimension;
/// - uses the collection named by the dimension's `collection` option, or
///   the base collection;
/// - inherits the base statics except the overridden operations and the
///   dimension's getter;
/// - carries a bound copy of every discriminator of `base`.
///
/// Binding a model whose schema never had the dimension applied is allowed;
/// the schema has no hooks for it, so only the batch operations stamp ids.
pub fn bind(
    base: &Model,
    dimension_id: impl Into<DimensionId>,
    options: Arc<DimensionOptions>,
) -> TenancyResult<Model> {
    let dimension_id = dimension_id.into();

    let mut dimensions = base.dimension_registry().clone();
    dimensions.remove(&options.dimension);
    dimensions.add(
        &options.dimension,
        DimensionEntry::bound(options.clone(), dimension_id.clone()),
        Some(base.name()),
    )?;

    let collection = options.collection_name(&CollectionContext {
        model_name: base.name(),
        collection: base.collection_name(),
        dimension: &options.dimension,
        dimension_id_key: &options.dimension_id_key,
        dimension_id: &dimension_id,
    })?;

    let statics: BTreeMap<_, _> = base
        .statics()
        .iter()
        .filter(|(name, _)| {
            !RESERVED_STATICS.contains(&name.as_str()) && **name != options.dimension_id_getter
        })
        .map(|(name, method)| (name.clone(), method.clone()))
        .collect();

    let binding = Binding {
        base: base.clone(),
        db: DimensionAwareDb::new(
            base.connection()?.downgrade(),
            dimension_id.clone(),
            options.clone(),
        ),
        dimension_id: dimension_id.clone(),
        options: options.clone(),
    };
    let bound = Model::derive(base, collection, dimensions, binding, statics);

    for (name, discriminator) in base.discriminators() {
        let bound_discriminator = bind(&discriminator, dimension_id.clone(), options.clone())?;
        bound.insert_discriminator(&name, bound_discriminator);
    }

    tracing::debug!(
        model = %base.name(),
        dimension = %options.dimension,
        dimension_id = %dimension_id,
        collection = %bound.collection_name(),
        "bound model"
    );
    Ok(bound)
}

/// Returns `model` bound to `dimension_id` through the accessor described by
/// `options`.
///
/// A disabled dimension returns the registered, unbound model. Otherwise any
/// existing binding of the same dimension is dropped first, so rebinding
/// replaces the id rather than stacking a second one.
pub(crate) fn resolve_accessor(
    model: &Model,
    options: &Arc<DimensionOptions>,
    dimension_id: DimensionId,
) -> TenancyResult<Model> {
    let connection = model.connection()?;
    if !options.enabled {
        return connection.model(model.name());
    }

    let base = model.without_dimension(&options.dimension)?;
    let key = CacheKey::new(&base, &options.dimension, &dimension_id);
    connection
        .cache()
        .get_or_try_insert_with(key, || bind(&base, dimension_id, options.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{PluginOptions, resolve};
    use crate::model::Connection;
    use crate::schema::Schema;
    use serde_json::json;

    fn options() -> Arc<DimensionOptions> {
        Arc::new(resolve(&PluginOptions::default()))
    }

    #[test]
    fn test_bind_records_the_id() {
        let connection = Connection::in_memory();
        let model = connection.register("Item", Schema::new()).unwrap();
        let bound = bind(&model, "a", options()).unwrap();

        assert_eq!(bound.dimension_id("tenant"), Some(DimensionId::from("a")));
        assert_eq!(bound.name(), "Item");
        assert_eq!(bound.collection_name(), "items");
        assert!(bound.binding().unwrap().base().ptr_eq(&model));
        assert!(model.dimension_id("tenant").is_none());
    }

    #[test]
    fn test_bind_is_not_cached() {
        let connection = Connection::in_memory();
        let model = connection.register("Item", Schema::new()).unwrap();
        let first = bind(&model, "a", options()).unwrap();
        let second = bind(&model, "a", options()).unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(connection.bound_model_count(), 0);
    }

    #[test]
    fn test_collection_template() {
        let connection = Connection::in_memory();
        let model = connection.register("Item", Schema::new()).unwrap();
        let options = Arc::new(resolve(
            &PluginOptions::default().with_collection("{{tenantId}}_{{collection}}"),
        ));
        let bound = bind(&model, "acme", options).unwrap();
        assert_eq!(bound.collection_name(), "acme_items");
    }

    #[test]
    fn test_statics_are_inherited() {
        let connection = Connection::in_memory();
        let mut schema = Schema::new();
        schema
            .add_static("recent", |model, _| Ok(model.find(json!({}))))
            .add_static("deleteOne", |model, _| Ok(model.find(json!({}))))
            .add_static("getTenantId", |model, _| Ok(model.find(json!({}))));
        let model = connection.register("Item", schema).unwrap();

        let bound = bind(&model, "a", options()).unwrap();
        let names: Vec<_> = bound.statics().keys().cloned().collect();
        assert_eq!(names, vec!["recent".to_string()]);
        assert_eq!(model.statics().len(), 3);
    }

    #[test]
    fn test_stamp_and_match() {
        let connection = Connection::in_memory();
        let model = connection.register("Item", Schema::new()).unwrap();
        let bound = bind(&model, 5, options()).unwrap();
        let binding = bound.binding().unwrap();

        let mut doc = Document::new();
        doc.insert("tenantId".to_string(), json!(9));
        binding.stamp(&mut doc);
        assert_eq!(doc.get("tenantId"), Some(&json!(5)));

        let mut pipeline = vec![json!({"$sort": {"k": 1}})];
        binding.prepend_match(&mut pipeline);
        assert_eq!(
            pipeline,
            vec![json!({"$match": {"tenantId": 5}}), json!({"$sort": {"k": 1}})]
        );
    }

    #[test]
    fn test_discriminators_are_bound() {
        let connection = Connection::in_memory();
        let model = connection.register("Item", Schema::new()).unwrap();
        model
            .discriminator("Special", Schema::from_json(json!({"level": "Number"})).unwrap())
            .unwrap();

        let bound = bind(&model, "a", options()).unwrap();
        let special = bound.get_discriminator("Special").unwrap();
        assert_eq!(special.dimension_id("tenant"), Some(DimensionId::from("a")));
        assert!(!special.ptr_eq(&model.get_discriminator("Special").unwrap()));
    }
}
