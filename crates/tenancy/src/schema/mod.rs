//! Schemas: fields, indexes, hooks and statics.
//!
//! A [`Schema`] describes the documents of one model. Plugins extend it
//! before it is compiled into a model: they add fields, rewrite indexes,
//! register pre hooks for queries and documents, and install statics.
//!
//! # Hooks
//!
//! | Hook | Fires |
//! |------|-------|
//! | [`QueryHook`] | before a query of the registered [`QueryOp`] executes |
//! | [`DocumentHook`] | before a document is validated or saved |

mod extend;
mod field;
mod index;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::dimension::{DimensionOptions, DimensionRegistry, DimensionSubject};
use crate::error::{TenancyResult, ValidationError};
use crate::model::{DocumentInstance, Model, Query, QueryOp};
use crate::plugin::TenancyPlugin;
use crate::store::Document;
use crate::store::filter::get_path;

pub use extend::{compound_indexes, extend};
pub use field::{FieldDef, FieldIndex, FieldType};
pub use index::{IndexOptions, IndexSpec};

/// Hook run before a query executes. It may rewrite conditions and updates.
pub type QueryHook = Arc<dyn Fn(&mut Query) -> TenancyResult<()> + Send + Sync>;

/// Hook run before a document is validated or saved.
pub type DocumentHook = Arc<dyn Fn(&mut DocumentInstance) -> TenancyResult<()> + Send + Sync>;

/// A model-level function registered on the schema.
///
/// Statics receive the model they are called on, so a static called on a
/// bound model builds queries scoped to that model's dimensions.
pub type StaticMethod = Arc<dyn Fn(&Model, Value) -> TenancyResult<Query> + Send + Sync>;

/// Document lifecycle events that accept pre hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentEvent {
    /// Before required-field validation.
    Validate,
    /// Before the document is written.
    Save,
}

/// Describes the documents of one model.
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldDef)>,
    indexes: Vec<IndexSpec>,
    query_hooks: Vec<(QueryOp, QueryHook)>,
    document_hooks: Vec<(DocumentEvent, DocumentHook)>,
    statics: BTreeMap<String, StaticMethod>,
    dimensions: DimensionRegistry,
    accessors: Vec<Arc<DimensionOptions>>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from a JSON object of field definitions.
    ///
    /// Each value is either a type name (`"String"`) or a full field
    /// definition (`{"type": "String", "unique": true}`).
    pub fn from_json(definition: Value) -> TenancyResult<Self> {
        let Value::Object(fields) = definition else {
            return Err(ValidationError::InvalidArguments {
                operation: "Schema::from_json".to_string(),
                message: "schema definition must be an object".to_string(),
            }
            .into());
        };
        let mut schema = Schema::new();
        for (name, value) in fields {
            schema.add(name, FieldDef::from_json(value)?);
        }
        Ok(schema)
    }

    /// Adds or replaces a field.
    pub fn add(&mut self, name: impl Into<String>, field: FieldDef) -> &mut Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = field,
            None => self.fields.push((name, field)),
        }
        self
    }

    /// Returns the definition of `name`.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Iterates over fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub(crate) fn fields_mut(&mut self) -> impl Iterator<Item = &mut (String, FieldDef)> {
        self.fields.iter_mut()
    }

    /// Declares a schema-level index.
    pub fn index(&mut self, keys: &[(&str, i32)], options: IndexOptions) -> &mut Self {
        let keys = keys.iter().map(|(k, d)| (k.to_string(), *d)).collect();
        self.indexes.push(IndexSpec::new(keys, options));
        self
    }

    /// Returns the schema-level index declarations.
    pub fn schema_indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }

    pub(crate) fn indexes_mut(&mut self) -> &mut Vec<IndexSpec> {
        &mut self.indexes
    }

    /// Compiles every index the model needs: schema-level declarations
    /// followed by field-level ones.
    pub fn indexes(&self) -> Vec<IndexSpec> {
        let mut indexes = self.indexes.clone();
        for (name, field) in &self.fields {
            if !field.is_indexed() {
                continue;
            }
            let mut options = field.index_options().cloned().unwrap_or_default();
            if field.unique == Some(true) {
                options.unique = Some(true);
            }
            if options.sparse.is_none() {
                options.sparse = field.sparse;
            }
            indexes.push(IndexSpec::new(vec![(name.clone(), 1)], options));
        }
        indexes
    }

    /// Registers a pre hook for one query operation.
    pub fn pre_query(&mut self, op: QueryOp, hook: QueryHook) -> &mut Self {
        self.query_hooks.push((op, hook));
        self
    }

    /// Registers the same pre hook for several query operations.
    pub fn pre_queries(&mut self, ops: &[QueryOp], hook: QueryHook) -> &mut Self {
        for op in ops {
            self.query_hooks.push((*op, hook.clone()));
        }
        self
    }

    /// Returns the hooks registered for `op`, in registration order.
    pub fn query_hooks(&self, op: QueryOp) -> Vec<QueryHook> {
        self.query_hooks
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, hook)| hook.clone())
            .collect()
    }

    /// Registers a document pre hook.
    pub fn pre_document(&mut self, event: DocumentEvent, hook: DocumentHook) -> &mut Self {
        self.document_hooks.push((event, hook));
        self
    }

    /// Returns the hooks registered for `event`, in registration order.
    pub fn document_hooks(&self, event: DocumentEvent) -> Vec<DocumentHook> {
        self.document_hooks
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, hook)| hook.clone())
            .collect()
    }

    /// Registers a static.
    pub fn add_static<F>(&mut self, name: impl Into<String>, method: F) -> &mut Self
    where
        F: Fn(&Model, Value) -> TenancyResult<Query> + Send + Sync + 'static,
    {
        self.statics.insert(name.into(), Arc::new(method));
        self
    }

    /// Returns the registered statics.
    pub fn statics(&self) -> &BTreeMap<String, StaticMethod> {
        &self.statics
    }

    /// Returns the dimensions applied to this schema.
    pub fn dimensions(&self) -> &DimensionRegistry {
        &self.dimensions
    }

    pub(crate) fn dimensions_mut(&mut self) -> &mut DimensionRegistry {
        &mut self.dimensions
    }

    /// Applies a tenancy plugin to this schema.
    pub fn plugin(&mut self, plugin: &TenancyPlugin) -> TenancyResult<&mut Self> {
        plugin.apply(self)?;
        Ok(self)
    }

    pub(crate) fn register_accessor(&mut self, options: Arc<DimensionOptions>) {
        self.accessors
            .retain(|o| o.accessor_method != options.accessor_method);
        self.accessors.push(options);
    }

    /// Returns the options behind the accessor called `name`.
    pub fn accessor(&self, name: &str) -> Option<&Arc<DimensionOptions>> {
        self.accessors.iter().find(|o| o.accessor_method == name)
    }

    /// Returns the options behind the getter called `name`.
    pub fn getter(&self, name: &str) -> Option<&Arc<DimensionOptions>> {
        self.accessors.iter().find(|o| o.dimension_id_getter == name)
    }

    /// Returns the options of the accessor installed for `dimension`.
    pub fn accessor_for_dimension(&self, dimension: &str) -> Option<&Arc<DimensionOptions>> {
        self.accessors.iter().rev().find(|o| o.dimension == dimension)
    }

    /// Returns the options of every installed accessor, in installation order.
    pub fn accessors(&self) -> &[Arc<DimensionOptions>] {
        &self.accessors
    }

    /// Fills in declared defaults for fields missing from `doc`.
    pub fn apply_defaults(&self, doc: &mut Document) {
        for (name, field) in &self.fields {
            if let Some(default) = &field.default {
                if !doc.contains_key(name) {
                    doc.insert(name.clone(), default.clone());
                }
            }
        }
    }

    /// Checks that every required field carries a non-null value.
    pub fn validate(&self, doc: &Document) -> Result<(), ValidationError> {
        for (name, field) in &self.fields {
            if field.required && get_path(doc, name).is_none_or(Value::is_null) {
                return Err(ValidationError::InvalidDocument {
                    path: name.clone(),
                    message: format!("Path `{name}` is required."),
                });
            }
        }
        Ok(())
    }

    /// Returns a copy of this schema extended by `child`: fields, indexes,
    /// hooks and statics of `child` are added after this schema's own.
    pub fn merged_with(&self, child: &Schema) -> Schema {
        let mut merged = self.clone();
        for (name, field) in &child.fields {
            merged.add(name.clone(), field.clone());
        }
        merged.indexes.extend(child.indexes.iter().cloned());
        merged
            .query_hooks
            .extend(child.query_hooks.iter().cloned());
        merged
            .document_hooks
            .extend(child.document_hooks.iter().cloned());
        for (name, method) in &child.statics {
            merged.statics.insert(name.clone(), method.clone());
        }
        merged
    }
}

impl DimensionSubject for Schema {
    fn dimension_registry(&self) -> &DimensionRegistry {
        &self.dimensions
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("fields", &self.fields)
            .field("indexes", &self.indexes)
            .field("query_hooks", &self.query_hooks.len())
            .field("document_hooks", &self.document_hooks.len())
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .field("dimensions", &self.dimensions)
            .finish()
    }
}
