//! Helios Tenancy
//!
//! Transparent multi-tenant isolation for document models. A schema gets one
//! or more *dimensions* (the default is `tenant`); each dimension adds an id
//! field, rewrites unique indexes to be unique per id, and installs an
//! accessor that returns the model bound to one id. Everything done through
//! a bound model stays inside that id:
//!
//! - query conditions are pinned to the id;
//! - updates and replacements cannot move a document to another id;
//! - new documents are stamped with the id;
//! - batch inserts, deletes, bulk writes and aggregations are stamped or
//!   filtered the same way.
//!
//! # Architecture
//!
//! - [`dimension`] - plugin options, their resolution, and the per-subject
//!   dimension registry
//! - [`schema`] - fields, indexes, hooks and the schema extender
//! - [`plugin`] - [`TenancyPlugin`], which applies one dimension to a schema
//! - [`middleware`] - the query and document hooks the plugin installs
//! - [`model`] - connections, models, queries and document instances
//! - [`api`] - binding, the bound model cache, the dimension-aware db and
//!   the batch argument normalizers
//! - [`store`] - the [`DocumentStore`](store::DocumentStore) trait and the
//!   in-memory store
//! - [`error`] - error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use helios_tenancy::{Connection, Schema, TenancyPlugin};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), helios_tenancy::TenancyError> {
//! let connection = Connection::in_memory();
//!
//! let mut schema = Schema::from_json(json!({"name": "String"}))?;
//! schema.plugin(&TenancyPlugin::default())?;
//! let users = connection.register("User", schema)?;
//!
//! let acme = users.by_tenant("acme")?;
//! acme.create(json!({"name": "Ada"})).await?;
//! users.by_tenant("globex")?.create(json!({"name": "Grace"})).await?;
//!
//! let found = acme.find(json!({})).exec().await?.documents();
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].get("tenantId"), Some(&json!("acme")));
//!
//! // Bound models are cached.
//! assert!(acme.ptr_eq(&users.by_tenant("acme")?));
//! # Ok(())
//! # }
//! ```
//!
//! # Several dimensions
//!
//! ```
//! use helios_tenancy::{Connection, PluginOptions, Schema, TenancyPlugin};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), helios_tenancy::TenancyError> {
//! let connection = Connection::in_memory();
//! let mut schema = Schema::from_json(json!({"email": {"type": "String", "unique": true}}))?;
//! schema.plugin(&TenancyPlugin::default())?;
//! schema.plugin(&TenancyPlugin::new(
//!     PluginOptions::default().with_dimension("customer"),
//! ))?;
//! let contacts = connection.register("Contact", schema)?;
//!
//! let scoped = contacts.by_tenant("acme")?.by_dimension("customer", "c-1")?;
//! assert_eq!(scoped.dimension_id("tenant").unwrap().as_str(), Some("acme"));
//! assert_eq!(scoped.dimension_id("customer").unwrap().as_str(), Some("c-1"));
//!
//! // `email` is unique per (customer, tenant).
//! let unique = contacts
//!     .schema()
//!     .indexes()
//!     .into_iter()
//!     .find(|index| index.is_unique())
//!     .unwrap();
//! assert_eq!(unique.fields(), vec!["customerId", "tenantId", "email"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod dimension;
pub mod error;
pub mod middleware;
pub mod model;
pub mod plugin;
pub mod schema;
pub mod store;

// Re-export commonly used types at crate root
pub use dimension::{DimensionId, DimensionOptions, PluginOptions};
pub use error::{ConfigError, StoreError, TenancyError, TenancyResult, ValidationError};
pub use model::{Connection, DocumentInstance, Model, Query, QueryOp, QueryOutcome};
pub use plugin::TenancyPlugin;
pub use schema::{FieldDef, FieldType, IndexOptions, Schema};

// Re-export binding entry points
pub use api::{AggregateArg, Db, DimensionAwareDb, bind};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
