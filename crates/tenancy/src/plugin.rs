//! The tenancy plugin.

use std::sync::Arc;

use crate::dimension::{DimensionEntry, DimensionOptions, PluginOptions, dimensions, resolve};
use crate::error::{ConfigError, TenancyResult};
use crate::middleware;
use crate::schema::{Schema, extend};

/// Applies one dimension to a schema.
///
/// # Example
///
/// ```
/// use helios_tenancy::dimension::PluginOptions;
/// use helios_tenancy::plugin::TenancyPlugin;
/// use helios_tenancy::schema::Schema;
/// use serde_json::json;
///
/// let mut schema = Schema::from_json(json!({"name": "String"})).unwrap();
/// schema.plugin(&TenancyPlugin::default()).unwrap();
/// schema
///     .plugin(&TenancyPlugin::new(PluginOptions::default().with_dimension("customer")))
///     .unwrap();
///
/// assert!(schema.field("tenantId").is_some());
/// assert!(schema.field("customerId").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TenancyPlugin {
    options: PluginOptions,
}

impl TenancyPlugin {
    /// Creates a plugin from raw options.
    pub fn new(options: PluginOptions) -> Self {
        Self { options }
    }

    /// Returns the raw options.
    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    /// Applies the dimension to `schema` and returns its resolved options.
    ///
    /// Applying identical options twice is a no-op. Applying different
    /// options for a dimension that is already applied fails with
    /// [`ConfigError::DuplicateDimension`], and so does disabling an applied
    /// dimension. A disabled plugin on a fresh dimension only installs its
    /// accessor, which then hands back the unbound model.
    pub fn apply(&self, schema: &mut Schema) -> TenancyResult<Arc<DimensionOptions>> {
        let options = Arc::new(resolve(&self.options));
        if let Some(naming) = &options.collection {
            naming.validate(&options.dimension_id_key)?;
        }

        let registered = dimensions(Some(&*schema))?;
        let duplicate = |dimension: &str| ConfigError::DuplicateDimension {
            dimension: dimension.to_string(),
            model: registered.subject_name().to_string(),
        };

        if let Some(existing) = registered.get(&options.dimension) {
            if **existing.options() == *options {
                tracing::debug!(dimension = %options.dimension, "dimension already applied");
                return Ok(existing.options().clone());
            }
            // A disabled apply must not replace the accessor of an applied dimension.
            if !options.enabled {
                return Err(duplicate(&options.dimension).into());
            }
        }

        if !options.enabled {
            let active = schema
                .accessor(&options.accessor_method)
                .filter(|active| active.enabled);
            if let Some(active) = active {
                return Err(duplicate(&active.dimension).into());
            }
            tracing::debug!(dimension = %options.dimension, "tenancy plugin disabled");
            schema.register_accessor(options.clone());
            return Ok(options);
        }

        schema.dimensions_mut().add(
            &options.dimension,
            DimensionEntry::new(options.clone()),
            None,
        )?;
        extend(
            schema,
            &options.dimension_id_key,
            options.dimension_id_type,
            options.require_dimension_id,
        );
        middleware::install(schema, &options);
        schema.register_accessor(options.clone());

        tracing::debug!(
            dimension = %options.dimension,
            key = %options.dimension_id_key,
            accessor = %options.accessor_method,
            "applied tenancy plugin"
        );
        Ok(options)
    }
}
