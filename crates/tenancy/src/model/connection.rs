//! Connections: the model registry and the store handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::api::ModelCache;
use crate::error::{ConfigError, TenancyResult};
use crate::schema::Schema;
use crate::store::{DocumentStore, MemoryStore};

use super::Model;

/// Owns the document store, the registered models and the bound model
/// cache.
///
/// Cloning a connection is cheap; clones share everything.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

pub(crate) struct ConnectionInner {
    store: Arc<dyn DocumentStore>,
    models: RwLock<HashMap<String, Model>>,
    cache: ModelCache,
}

impl Connection {
    /// Creates a connection over `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                store,
                models: RwLock::new(HashMap::new()),
                cache: ModelCache::new(),
            }),
        }
    }

    /// Creates a connection over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Compiles `schema` into a model called `name`.
    ///
    /// The collection name is the lowercased model name, pluralized with a
    /// trailing `s` unless it already ends in one.
    pub fn register(&self, name: &str, schema: Schema) -> TenancyResult<Model> {
        let mut collection = name.to_lowercase();
        if !collection.ends_with('s') {
            collection.push('s');
        }
        self.register_in(name, &collection, schema)
    }

    /// Compiles `schema` into a model called `name` stored in `collection`.
    pub fn register_in(&self, name: &str, collection: &str, schema: Schema) -> TenancyResult<Model> {
        let model = Model::compile(
            name,
            Arc::new(schema),
            collection,
            self.inner.store.clone(),
            self.downgrade(),
            None,
        );
        self.insert_model(name, model.clone())?;
        tracing::debug!(model = name, collection, "registered model");
        Ok(model)
    }

    pub(crate) fn insert_model(&self, name: &str, model: Model) -> Result<(), ConfigError> {
        let mut models = self.inner.models.write();
        if models.contains_key(name) {
            return Err(ConfigError::DuplicateModel {
                name: name.to_string(),
            });
        }
        models.insert(name.to_string(), model);
        Ok(())
    }

    /// Returns the registered model called `name`.
    pub fn model(&self, name: &str) -> TenancyResult<Model> {
        self.inner
            .models
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ConfigError::UnknownModel {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Returns the names of the registered models, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.models.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    pub(crate) fn cache(&self) -> &ModelCache {
        &self.inner.cache
    }

    /// Returns the number of bound models created so far.
    pub fn bound_model_count(&self) -> usize {
        self.inner.cache.len()
    }

    pub(crate) fn downgrade(&self) -> WeakConnection {
        WeakConnection(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("backend", &self.inner.store.backend_name())
            .field("models", &self.model_names())
            .field("bound_models", &self.inner.cache.len())
            .finish()
    }
}

/// A non-owning handle to a [`Connection`].
///
/// Models hold their connection weakly so the connection's registry and
/// cache can own models without forming a cycle.
#[derive(Clone, Default)]
pub struct WeakConnection(Weak<ConnectionInner>);

impl WeakConnection {
    /// Returns the connection if it is still alive.
    pub fn upgrade(&self) -> Option<Connection> {
        self.0.upgrade().map(|inner| Connection { inner })
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.strong_count() > 0 {
            "WeakConnection(alive)"
        } else {
            "WeakConnection(closed)"
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let connection = Connection::in_memory();
        let model = connection.register("User", Schema::new()).unwrap();
        assert_eq!(model.collection_name(), "users");
        assert!(connection.model("User").unwrap().ptr_eq(&model));
        assert_eq!(connection.model_names(), vec!["User".to_string()]);
    }

    #[test]
    fn test_collection_naming() {
        let connection = Connection::in_memory();
        let model = connection.register("Address", Schema::new()).unwrap();
        assert_eq!(model.collection_name(), "address");
        let model = connection
            .register_in("Log", "audit_log", Schema::new())
            .unwrap();
        assert_eq!(model.collection_name(), "audit_log");
    }

    #[test]
    fn test_duplicate_model() {
        let connection = Connection::in_memory();
        connection.register("User", Schema::new()).unwrap();
        let err = connection.register("User", Schema::new()).unwrap_err();
        assert_eq!(err.to_string(), "model \"User\" is already registered");
    }

    #[test]
    fn test_unknown_model() {
        let connection = Connection::in_memory();
        let err = connection.model("Nope").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_model_outliving_connection() {
        let model = {
            let connection = Connection::in_memory();
            connection
                .register("User", Schema::from_json(json!({"name": "String"})).unwrap())
                .unwrap()
        };
        let err = model.connection().unwrap_err();
        assert_eq!(
            err.to_string(),
            "connection for model \"User\" has been closed"
        );
    }
}
