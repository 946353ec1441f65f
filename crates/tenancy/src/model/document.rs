//! Document instances.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::dimension::{DimensionId, DimensionRegistry, DimensionSubject};
use crate::error::{TenancyResult, ValidationError};
use crate::schema::DocumentEvent;
use crate::store::filter::{get_path, remove_path, set_path, values_equal};
use crate::store::{Document, InsertManyOptions, UpdateOptions};

use super::{DISCRIMINATOR_KEY, Model};

/// A document bound to the model that created or loaded it.
///
/// Instances created from a bound model carry that model's dimension
/// context: [`DocumentInstance::dimension_id`] answers with the bound id
/// whatever the document data says, and saving stamps the id back into the
/// data.
#[derive(Clone)]
pub struct DocumentInstance {
    model: Model,
    data: Document,
    is_new: bool,
    populated: BTreeMap<String, Vec<DocumentInstance>>,
}

impl DocumentInstance {
    pub(crate) fn new(model: Model, mut data: Document) -> Self {
        model.schema().apply_defaults(&mut data);
        if let Some(tag) = model.discriminator_value() {
            data.insert(DISCRIMINATOR_KEY.to_string(), Value::String(tag.to_string()));
        }
        Self {
            model,
            data,
            is_new: true,
            populated: BTreeMap::new(),
        }
    }

    pub(crate) fn hydrate(model: Model, data: Document) -> Self {
        Self {
            model,
            data,
            is_new: false,
            populated: BTreeMap::new(),
        }
    }

    /// Returns the model this instance belongs to.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns the value at a dotted `path`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.data, path)
    }

    /// Sets the value at a dotted `path`, creating intermediate objects.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> TenancyResult<()> {
        set_path(&mut self.data, path, value.into())?;
        Ok(())
    }

    /// Removes the value at a dotted `path`.
    pub fn unset(&mut self, path: &str) -> Option<Value> {
        remove_path(&mut self.data, path)
    }

    /// Returns the document data.
    pub fn data(&self) -> &Document {
        &self.data
    }

    /// Returns the document data for modification.
    pub fn data_mut(&mut self) -> &mut Document {
        &mut self.data
    }

    /// Consumes the instance, returning its data.
    pub fn into_data(self) -> Document {
        self.data
    }

    /// Returns a JSON copy of the data.
    pub fn to_object(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Returns the `_id`, once assigned.
    pub fn id(&self) -> Option<&Value> {
        self.data.get("_id")
    }

    /// Returns `true` until the instance has been saved.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Returns the id the instance's model is bound to for `dimension`.
    pub fn dimension_id(&self, dimension: &str) -> Option<DimensionId> {
        self.model.dimension_id(dimension)
    }

    /// Calls a dimension id getter by its configured name.
    pub fn call_getter(&self, name: &str) -> TenancyResult<Option<DimensionId>> {
        self.model.call_getter(name)
    }

    /// Returns the instances loaded for a populated `path`.
    pub fn populated(&self, path: &str) -> Option<&[DocumentInstance]> {
        self.populated.get(path).map(Vec::as_slice)
    }

    pub(crate) fn resolve_population(&mut self, path: &str, found: &[DocumentInstance]) {
        let lookup = |id: &Value| {
            found
                .iter()
                .find(|doc| doc.id().is_some_and(|candidate| values_equal(candidate, id)))
        };

        let Some(current) = get_path(&self.data, path).cloned() else {
            return;
        };
        let mut loaded = Vec::new();
        let replacement = match current {
            Value::Array(ids) => Value::Array(
                ids.iter()
                    .filter_map(lookup)
                    .map(|doc| {
                        loaded.push(doc.clone());
                        doc.to_object()
                    })
                    .collect(),
            ),
            id => match lookup(&id) {
                Some(doc) => {
                    loaded.push(doc.clone());
                    doc.to_object()
                }
                None => Value::Null,
            },
        };
        if set_path(&mut self.data, path, replacement).is_ok() {
            self.populated.insert(path.to_string(), loaded);
        }
    }

    /// Runs validate hooks, then checks required fields.
    pub fn validate(&mut self) -> TenancyResult<()> {
        let model = self.model.clone();
        for hook in model.schema().document_hooks(DocumentEvent::Validate) {
            hook(self)?;
        }
        model.schema().validate(&self.data)?;
        Ok(())
    }

    /// Validates and writes the instance.
    ///
    /// New instances are inserted; loaded instances replace the stored
    /// document with the same `_id`.
    pub async fn save(&mut self) -> TenancyResult<()> {
        self.validate()?;
        let model = self.model.clone();
        for hook in model.schema().document_hooks(DocumentEvent::Save) {
            hook(self)?;
        }

        let store = model.store();
        if self.is_new {
            let stored = store
                .insert_many(
                    model.collection_name(),
                    vec![self.data.clone()],
                    &InsertManyOptions::default(),
                )
                .await?;
            if let Some(doc) = stored.into_iter().next() {
                self.data = doc;
            }
            self.is_new = false;
        } else {
            let id = self.id().cloned().ok_or_else(|| ValidationError::InvalidDocument {
                path: "_id".to_string(),
                message: "cannot save a loaded document without an _id".to_string(),
            })?;
            let mut filter = Document::new();
            filter.insert("_id".to_string(), id);
            let options = UpdateOptions {
                replace: true,
                ..UpdateOptions::default()
            };
            store
                .update(model.collection_name(), &filter, &self.data, &options)
                .await?;
        }
        tracing::trace!(model = %model.name(), collection = %model.collection_name(), "saved document");
        Ok(())
    }
}

impl DimensionSubject for DocumentInstance {
    fn dimension_registry(&self) -> &DimensionRegistry {
        self.model.dimension_registry()
    }

    fn subject_name(&self) -> Option<&str> {
        Some(self.model.name())
    }
}

impl fmt::Debug for DocumentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentInstance")
            .field("model", &self.model.name())
            .field("data", &self.data)
            .field("is_new", &self.is_new)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Connection;
    use crate::schema::Schema;
    use serde_json::json;

    fn model() -> (Connection, Model) {
        let connection = Connection::in_memory();
        let schema = Schema::from_json(json!({
            "name": {"type": "String", "required": true},
            "status": {"type": "String", "default": "active"}
        }))
        .unwrap();
        let model = connection.register("Item", schema).unwrap();
        (connection, model)
    }

    #[test]
    fn test_new_applies_defaults() {
        let (_connection, model) = model();
        let doc = model.new_document(json!({"name": "a"})).unwrap();
        assert_eq!(doc.get("status"), Some(&json!("active")));
        assert!(doc.is_new());
        assert!(doc.id().is_none());
    }

    #[test]
    fn test_set_and_unset() {
        let (_connection, model) = model();
        let mut doc = model.new_document(json!({"name": "a"})).unwrap();
        doc.set("meta.size", 3).unwrap();
        assert_eq!(doc.get("meta.size"), Some(&json!(3)));
        assert_eq!(doc.unset("meta.size"), Some(json!(3)));
        assert!(doc.get("meta.size").is_none());
    }

    #[test]
    fn test_validate_required() {
        let (_connection, model) = model();
        let mut doc = model.new_document(json!({})).unwrap();
        let err = doc.validate().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Path `name` is required."));
    }

    #[tokio::test]
    async fn test_save_inserts_then_replaces() {
        let (_connection, model) = model();
        let mut doc = model.new_document(json!({"name": "a"})).unwrap();
        doc.save().await.unwrap();
        assert!(!doc.is_new());
        assert!(doc.id().is_some());

        doc.set("name", "b").unwrap();
        doc.save().await.unwrap();

        let found = model.find(json!({})).exec().await.unwrap().documents();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get("name"), Some(&json!("b")));
    }

    #[test]
    fn test_unbound_instance_has_no_dimension_id() {
        let (_connection, model) = model();
        let doc = model.new_document(json!({"name": "a"})).unwrap();
        assert!(doc.dimension_id("tenant").is_none());
    }
}
