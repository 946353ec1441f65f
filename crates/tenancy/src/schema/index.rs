//! Index declarations.

use serde::{Deserialize, Serialize};

use crate::store::Document;

/// Options of an index, in the wire shape document databases use.
///
/// Recognized options are typed; anything else is kept in `extra` and
/// passed through to the store verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    /// Reject documents sharing the indexed key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,

    /// Skip documents missing every indexed field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse: Option<bool>,

    /// Only index documents matching this filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_filter_expression: Option<Document>,

    /// Build the index in the background.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,

    /// Expire documents after this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<u64>,

    /// Lower bound for geospatial indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Upper bound for geospatial indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    /// Explicit index name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Index format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<i32>,

    /// Keep a unique index global across dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_unique_key: Option<bool>,

    /// Options not interpreted by this layer.
    #[serde(flatten)]
    pub extra: Document,
}

impl IndexOptions {
    /// Options for a unique index.
    pub fn unique() -> Self {
        Self {
            unique: Some(true),
            ..Default::default()
        }
    }

    /// Sets `preserveUniqueKey`.
    pub fn with_preserve_unique_key(mut self, preserve: bool) -> Self {
        self.preserve_unique_key = Some(preserve);
        self
    }
}

/// An index: ordered key fields with their directions, plus options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Indexed fields in key order, with direction (`1` or `-1`).
    pub keys: Vec<(String, i32)>,
    /// Index options.
    pub options: IndexOptions,
}

impl IndexSpec {
    /// Creates an index declaration.
    pub fn new(keys: Vec<(String, i32)>, options: IndexOptions) -> Self {
        Self { keys, options }
    }

    /// Returns `true` if the index is unique.
    pub fn is_unique(&self) -> bool {
        self.options.unique == Some(true)
    }

    /// Returns the field names in key order.
    pub fn fields(&self) -> Vec<&str> {
        self.keys.iter().map(|(field, _)| field.as_str()).collect()
    }

    /// Returns the explicit name or the conventional `field_dir_...` name.
    pub fn name(&self) -> String {
        if let Some(name) = &self.options.name {
            return name.clone();
        }
        self.keys
            .iter()
            .map(|(field, direction)| format!("{field}_{direction}"))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Prepends `key` to the index, keeping any existing entry for it at
    /// the front with its original direction.
    pub(crate) fn prepend_key(&mut self, key: &str) {
        let direction = self
            .keys
            .iter()
            .find(|(field, _)| field == key)
            .map(|(_, direction)| *direction)
            .unwrap_or(1);
        self.keys.retain(|(field, _)| field != key);
        self.keys.insert(0, (key.to_string(), direction));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name() {
        let index = IndexSpec::new(
            vec![("tenantId".to_string(), 1), ("email".to_string(), -1)],
            IndexOptions::unique(),
        );
        assert_eq!(index.name(), "tenantId_1_email_-1");
        assert!(index.is_unique());

        let named = IndexSpec::new(
            vec![("a".to_string(), 1)],
            IndexOptions {
                name: Some("custom".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(named.name(), "custom");
    }

    #[test]
    fn test_prepend_key() {
        let mut index = IndexSpec::new(vec![("id".to_string(), 1)], IndexOptions::unique());
        index.prepend_key("tenantId");
        assert_eq!(index.fields(), vec!["tenantId", "id"]);

        let mut index = IndexSpec::new(
            vec![("id".to_string(), 1), ("tenantId".to_string(), -1)],
            IndexOptions::unique(),
        );
        index.prepend_key("tenantId");
        assert_eq!(
            index.keys,
            vec![("tenantId".to_string(), -1), ("id".to_string(), 1)]
        );
    }

    #[test]
    fn test_options_keep_unknown_fields() {
        let options: IndexOptions = serde_json::from_value(json!({
            "unique": true,
            "collation": {"locale": "en"},
            "expireAfterSeconds": 60
        }))
        .unwrap();
        assert_eq!(options.expire_after_seconds, Some(60));
        assert_eq!(options.extra.get("collation"), Some(&json!({"locale": "en"})));
    }
}
