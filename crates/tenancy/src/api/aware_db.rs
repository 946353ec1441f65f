//! Dimension-aware model lookup for bound models.

use std::sync::Arc;

use crate::dimension::{DimensionId, DimensionOptions, dimensions};
use crate::error::{ConfigError, TenancyResult};
use crate::model::{Connection, Model, WeakConnection};

/// What [`Model::db`] returns.
#[derive(Debug, Clone)]
pub enum Db {
    /// The plain connection of an unbound model.
    Connection(Connection),
    /// The dimension-aware wrapper of a bound model.
    DimensionAware(DimensionAwareDb),
}

impl Db {
    /// Looks up a model by name.
    pub fn model(&self, name: &str) -> TenancyResult<Model> {
        match self {
            Db::Connection(connection) => connection.model(name),
            Db::DimensionAware(db) => db.model(name),
        }
    }
}

/// Looks up models on behalf of a bound model, binding each compatible
/// model to the same id.
#[derive(Debug, Clone)]
pub struct DimensionAwareDb {
    connection: WeakConnection,
    dimension_id: DimensionId,
    options: Arc<DimensionOptions>,
}

impl DimensionAwareDb {
    pub(crate) fn new(
        connection: WeakConnection,
        dimension_id: DimensionId,
        options: Arc<DimensionOptions>,
    ) -> Self {
        Self {
            connection,
            dimension_id,
            options,
        }
    }

    /// Returns the id handed to compatible models.
    pub fn dimension_id(&self) -> &DimensionId {
        &self.dimension_id
    }

    /// Returns the model called `name`.
    ///
    /// If that model's schema carries the same dimension under the same id
    /// key, it comes back bound to this db's id through its own accessor.
    /// Otherwise it comes back unbound.
    pub fn model(&self, name: &str) -> TenancyResult<Model> {
        let connection = self.connection.upgrade().ok_or_else(|| ConfigError::ConnectionClosed {
            model: name.to_string(),
        })?;
        let model = connection.model(name)?;

        let accessor = dimensions(Some(&model))?
            .get(&self.options.dimension)
            .map(|entry| entry.options())
            .filter(|other| other.is_compatible_with(&self.options))
            .map(|other| other.accessor_method.clone());

        match accessor {
            Some(accessor) => {
                tracing::trace!(
                    model = name,
                    dimension = %self.options.dimension,
                    dimension_id = %self.dimension_id,
                    "binding referenced model"
                );
                model.call_accessor(&accessor, self.dimension_id.clone())
            }
            None => Ok(model),
        }
    }
}
