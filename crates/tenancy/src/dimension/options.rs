//! Plugin options and their resolution.
//!
//! [`PluginOptions`] is the raw, partially filled configuration a caller
//! hands to the plugin. [`resolve`] turns it into a fully populated
//! [`DimensionOptions`] record. Resolution is pure and never fails: absent
//! or empty values fall back to defaults derived from the dimension name.
//!
//! # Defaults
//!
//! For the dimension `customer`:
//!
//! | Option | Default |
//! |--------|---------|
//! | `dimensionIdKey` | `customerId` |
//! | `dimensionIdType` | `String` |
//! | `dimensionIdGetter` | `getCustomerId` |
//! | `accessorMethod` | `byCustomer` |
//! | `requireDimensionId` | `true` |
//! | `enabled` | `true` |
//!
//! The legacy flat keys `tenantIdKey`, `tenantIdType`, `tenantIdGetter` and
//! `requireTenantId` are honoured when the dimension-qualified key is absent.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;
use crate::schema::FieldType;

use super::DimensionId;

/// The dimension name used when none is configured.
pub const DEFAULT_DIMENSION: &str = "tenant";

const PLACEHOLDER_PATTERN: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";

static PLACEHOLDER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN));

/// Raw plugin configuration, as supplied by the caller.
///
/// Every field is optional. Unknown fields are ignored when loading from
/// JSON, so configuration written for other plugins can be passed through.
///
/// # Example
///
/// ```
/// use helios_tenancy::dimension::PluginOptions;
///
/// let options = PluginOptions::default()
///     .with_dimension("customer")
///     .with_id_key("customer");
/// assert_eq!(options.dimension.as_deref(), Some("customer"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginOptions {
    /// Name of the dimension (defaults to `tenant`).
    pub dimension: Option<String>,

    /// Document field holding the dimension id.
    pub dimension_id_key: Option<String>,

    /// Legacy name for `dimensionIdKey`.
    pub tenant_id_key: Option<String>,

    /// Declared type of the dimension id field.
    pub dimension_id_type: Option<FieldType>,

    /// Legacy name for `dimensionIdType`.
    pub tenant_id_type: Option<FieldType>,

    /// Name of the getter that exposes the bound id.
    pub dimension_id_getter: Option<String>,

    /// Legacy name for `dimensionIdGetter`.
    pub tenant_id_getter: Option<String>,

    /// Name of the accessor that produces bound models.
    pub accessor_method: Option<String>,

    /// Whether the dimension id field is required.
    pub require_dimension_id: Option<bool>,

    /// Legacy name for `requireDimensionId`.
    pub require_tenant_id: Option<bool>,

    /// When `false`, the plugin leaves the schema untouched and the accessor
    /// returns the unbound model.
    pub enabled: Option<bool>,

    /// Per-id collection routing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionNaming>,
}

impl PluginOptions {
    /// Loads options from a JSON value.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Sets the dimension name.
    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }

    /// Sets the document field holding the dimension id.
    pub fn with_id_key(mut self, key: impl Into<String>) -> Self {
        self.dimension_id_key = Some(key.into());
        self
    }

    /// Sets the declared id type.
    pub fn with_id_type(mut self, id_type: FieldType) -> Self {
        self.dimension_id_type = Some(id_type);
        self
    }

    /// Sets the getter name.
    pub fn with_id_getter(mut self, getter: impl Into<String>) -> Self {
        self.dimension_id_getter = Some(getter.into());
        self
    }

    /// Sets the accessor name.
    pub fn with_accessor(mut self, accessor: impl Into<String>) -> Self {
        self.accessor_method = Some(accessor.into());
        self
    }

    /// Sets whether the id field is required.
    pub fn with_required(mut self, required: bool) -> Self {
        self.require_dimension_id = Some(required);
        self
    }

    /// Disables the plugin.
    pub fn disabled(mut self) -> Self {
        self.enabled = Some(false);
        self
    }

    /// Routes every bound model to a collection named by `naming`.
    pub fn with_collection(mut self, naming: impl Into<CollectionNaming>) -> Self {
        self.collection = Some(naming.into());
        self
    }
}

/// Fully resolved options of one dimension.
///
/// Immutable once the plugin has been applied to a schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionOptions {
    /// Name of the dimension.
    pub dimension: String,
    /// Document field holding the dimension id.
    pub dimension_id_key: String,
    /// Declared type of the id field.
    pub dimension_id_type: FieldType,
    /// Name of the getter exposing the bound id.
    pub dimension_id_getter: String,
    /// Name of the accessor producing bound models.
    pub accessor_method: String,
    /// Whether the id field is required.
    pub require_dimension_id: bool,
    /// Whether the plugin is active.
    pub enabled: bool,
    /// Per-id collection routing, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionNaming>,
}

impl DimensionOptions {
    /// Returns `true` if a model configured with `other` may be bound to the
    /// same id when reached through a dimension-aware db.
    ///
    /// Both sides must be enabled and agree on the dimension name and on the
    /// document field holding the id.
    pub fn is_compatible_with(&self, other: &DimensionOptions) -> bool {
        self.enabled
            && other.enabled
            && !self.accessor_method.is_empty()
            && !other.accessor_method.is_empty()
            && self.dimension == other.dimension
            && self.dimension_id_key == other.dimension_id_key
    }

    /// Returns the collection a model bound to `context.dimension_id`
    /// should use.
    pub fn collection_name(&self, context: &CollectionContext<'_>) -> Result<String, ConfigError> {
        match &self.collection {
            Some(naming) => naming.render(context),
            None => Ok(context.collection.to_string()),
        }
    }
}

impl Default for DimensionOptions {
    fn default() -> Self {
        resolve(&PluginOptions::default())
    }
}

/// Resolves raw plugin options into a complete [`DimensionOptions`] record.
pub fn resolve(input: &PluginOptions) -> DimensionOptions {
    let dimension = non_empty(input.dimension.as_deref()).unwrap_or(DEFAULT_DIMENSION);
    let capitalized = capitalize(dimension);

    let dimension_id_key = non_empty(input.dimension_id_key.as_deref())
        .or(non_empty(input.tenant_id_key.as_deref()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{dimension}Id"));

    let dimension_id_getter = non_empty(input.dimension_id_getter.as_deref())
        .or(non_empty(input.tenant_id_getter.as_deref()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("get{capitalized}Id"));

    let accessor_method = non_empty(input.accessor_method.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| format!("by{capitalized}"));

    DimensionOptions {
        dimension: dimension.to_string(),
        dimension_id_key,
        dimension_id_type: input
            .dimension_id_type
            .or(input.tenant_id_type)
            .unwrap_or(FieldType::String),
        dimension_id_getter,
        accessor_method,
        require_dimension_id: input
            .require_dimension_id
            .or(input.require_tenant_id)
            .unwrap_or(true),
        enabled: input.enabled.unwrap_or(true),
        collection: input.collection.clone(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Values available when naming the collection of a bound model.
#[derive(Debug, Clone, Copy)]
pub struct CollectionContext<'a> {
    /// Name of the model being bound.
    pub model_name: &'a str,
    /// Collection of the unbound model.
    pub collection: &'a str,
    /// Name of the dimension.
    pub dimension: &'a str,
    /// Document field holding the id.
    pub dimension_id_key: &'a str,
    /// The id being bound.
    pub dimension_id: &'a DimensionId,
}

/// Signature of a programmatic collection naming strategy.
pub type CollectionNamer = dyn Fn(&CollectionContext<'_>) -> String + Send + Sync;

/// How a bound model names its collection.
///
/// Templates use `{{placeholder}}` syntax. Recognized placeholders are
/// `dimensionId`, the configured id key (e.g. `tenantId`), `collection`,
/// `modelName` and `dimension`.
#[derive(Clone)]
pub enum CollectionNaming {
    /// A string template such as `"{{tenantId}}_{{collection}}"`.
    Template(String),
    /// A closure computing the name.
    Custom(Arc<CollectionNamer>),
}

impl CollectionNaming {
    /// Creates a template strategy.
    pub fn template(template: impl Into<String>) -> Self {
        CollectionNaming::Template(template.into())
    }

    /// Creates a closure strategy.
    pub fn custom<F>(namer: F) -> Self
    where
        F: Fn(&CollectionContext<'_>) -> String + Send + Sync + 'static,
    {
        CollectionNaming::Custom(Arc::new(namer))
    }

    /// Checks a template for unknown placeholders without rendering it.
    pub fn validate(&self, dimension_id_key: &str) -> Result<(), ConfigError> {
        if let CollectionNaming::Template(template) = self {
            for name in placeholders(template)? {
                if !is_known_placeholder(&name, dimension_id_key) {
                    return Err(unknown_placeholder(template, &name));
                }
            }
        }
        Ok(())
    }

    /// Computes the collection name for `context`.
    pub fn render(&self, context: &CollectionContext<'_>) -> Result<String, ConfigError> {
        match self {
            CollectionNaming::Custom(namer) => Ok(namer(context)),
            CollectionNaming::Template(template) => {
                let pattern = placeholder_regex(template)?;
                let mut unknown = None;
                let rendered = pattern.replace_all(template, |caps: &regex::Captures<'_>| {
                    let name = &caps[1];
                    match placeholder_value(name, context) {
                        Some(value) => value,
                        None => {
                            unknown.get_or_insert_with(|| name.to_string());
                            String::new()
                        }
                    }
                });
                match unknown {
                    Some(name) => Err(unknown_placeholder(template, &name)),
                    None => Ok(rendered.into_owned()),
                }
            }
        }
    }
}

fn placeholder_regex(template: &str) -> Result<&'static Regex, ConfigError> {
    PLACEHOLDER.as_ref().map_err(|e| ConfigError::InvalidCollectionTemplate {
        template: template.to_string(),
        message: e.to_string(),
    })
}

fn placeholders(template: &str) -> Result<Vec<String>, ConfigError> {
    let pattern = placeholder_regex(template)?;
    Ok(pattern
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect())
}

fn is_known_placeholder(name: &str, dimension_id_key: &str) -> bool {
    matches!(name, "dimensionId" | "collection" | "modelName" | "dimension")
        || name == dimension_id_key
}

fn placeholder_value(name: &str, context: &CollectionContext<'_>) -> Option<String> {
    match name {
        "dimensionId" => Some(context.dimension_id.to_string()),
        "collection" => Some(context.collection.to_string()),
        "modelName" => Some(context.model_name.to_string()),
        "dimension" => Some(context.dimension.to_string()),
        key if key == context.dimension_id_key => Some(context.dimension_id.to_string()),
        _ => None,
    }
}

fn unknown_placeholder(template: &str, name: &str) -> ConfigError {
    ConfigError::InvalidCollectionTemplate {
        template: template.to_string(),
        message: format!("unknown placeholder \"{name}\""),
    }
}

impl fmt::Debug for CollectionNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionNaming::Template(t) => f.debug_tuple("Template").field(t).finish(),
            CollectionNaming::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

impl PartialEq for CollectionNaming {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CollectionNaming::Template(a), CollectionNaming::Template(b)) => a == b,
            (CollectionNaming::Custom(a), CollectionNaming::Custom(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for CollectionNaming {
    fn from(template: &str) -> Self {
        CollectionNaming::Template(template.to_string())
    }
}

impl From<String> for CollectionNaming {
    fn from(template: String) -> Self {
        CollectionNaming::Template(template)
    }
}

impl Serialize for CollectionNaming {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CollectionNaming::Template(t) => serializer.serialize_str(t),
            CollectionNaming::Custom(_) => serializer.serialize_str("<custom>"),
        }
    }
}

impl<'de> Deserialize<'de> for CollectionNaming {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(CollectionNaming::Template)
    }
}
