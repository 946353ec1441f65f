//! Field definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::IndexOptions;

/// Declared type of a schema field.
///
/// Types are metadata for the data-mapping layer. Casting is left to the
/// store, so values are written as given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// UTF-8 string.
    #[default]
    #[serde(alias = "string")]
    String,
    /// Integer or floating point number.
    #[serde(alias = "number")]
    Number,
    /// `true` or `false`.
    #[serde(alias = "boolean")]
    Boolean,
    /// Timestamp.
    #[serde(alias = "date")]
    Date,
    /// Store-generated identifier.
    #[serde(alias = "objectId", alias = "objectid")]
    ObjectId,
    /// List of values.
    #[serde(alias = "array")]
    Array,
    /// Anything.
    #[serde(alias = "mixed")]
    Mixed,
}

/// Field-level index declaration: `index: true` or `index: {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldIndex {
    /// Plain single-field index on or off.
    Flag(bool),
    /// Single-field index with options.
    Options(IndexOptions),
}

/// Definition of one schema field.
///
/// # Example
///
/// ```
/// use helios_tenancy::schema::{FieldDef, FieldType};
///
/// let email = FieldDef::new(FieldType::String).required().unique();
/// assert!(email.is_unique());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Declared type.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    /// Documents must carry a non-null value.
    #[serde(default)]
    pub required: bool,

    /// Field-level unique marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,

    /// Field-level index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<FieldIndex>,

    /// Field-level sparse flag, carried onto the field's index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<bool>,

    /// Keep a field-level unique index global across dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_unique_key: Option<bool>,

    /// Name of the model this field references.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Value assigned to new documents that lack the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    /// Creates a field of the given type.
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            ..Default::default()
        }
    }

    /// Marks the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as unique.
    pub fn unique(mut self) -> Self {
        self.unique = Some(true);
        self
    }

    /// Adds a plain single-field index.
    pub fn indexed(mut self) -> Self {
        self.index = Some(FieldIndex::Flag(true));
        self
    }

    /// Adds a single-field index with options.
    pub fn with_index(mut self, options: IndexOptions) -> Self {
        self.index = Some(FieldIndex::Options(options));
        self
    }

    /// Sets the field-level `preserveUniqueKey` flag.
    pub fn preserve_unique_key(mut self, preserve: bool) -> Self {
        self.preserve_unique_key = Some(preserve);
        self
    }

    /// Marks the field as a reference to `model`.
    pub fn reference(mut self, model: impl Into<String>) -> Self {
        self.reference = Some(model.into());
        self
    }

    /// Sets a default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns the options of the field's own index, if it declares them.
    pub fn index_options(&self) -> Option<&IndexOptions> {
        match &self.index {
            Some(FieldIndex::Options(options)) => Some(options),
            _ => None,
        }
    }

    /// Returns `true` if the field declares a unique single-field index.
    pub fn is_unique(&self) -> bool {
        self.index_options().and_then(|o| o.unique) == Some(true) || self.unique == Some(true)
    }

    /// Returns `true` if the field declares any single-field index.
    pub fn is_indexed(&self) -> bool {
        match &self.index {
            Some(FieldIndex::Flag(flag)) => *flag || self.unique == Some(true),
            Some(FieldIndex::Options(_)) => true,
            None => self.unique == Some(true),
        }
    }

    /// Returns whether a unique index on this field stays global.
    ///
    /// The index options are consulted first, then the field options.
    pub fn preserves_unique_key(&self) -> bool {
        self.index_options()
            .and_then(|o| o.preserve_unique_key)
            .or(self.preserve_unique_key)
            .unwrap_or(false)
    }

    /// Parses a field from its JSON shorthand (`"String"`) or full form.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(_) => Ok(FieldDef::new(serde_json::from_value(value)?)),
            other => serde_json::from_value(other),
        }
    }
}
