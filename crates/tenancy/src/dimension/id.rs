//! Dimension identifier type.
//!
//! This module defines the [`DimensionId`] type, the value a model is bound
//! to for one dimension (the tenant id for the default `tenant` dimension).

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque identifier for one value of a dimension.
///
/// Dimension ids are stored verbatim in documents, so any JSON scalar is a
/// valid id: strings, numbers, booleans and even `null`. Two ids are equal
/// when their JSON values are equal, which means the string `"1"` and the
/// number `1` are different ids.
///
/// # Examples
///
/// ```
/// use helios_tenancy::dimension::DimensionId;
///
/// let tenant = DimensionId::new("acme");
/// assert_eq!(tenant.to_string(), "acme");
/// assert_ne!(DimensionId::new("1"), DimensionId::from(1));
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionId(Value);

impl DimensionId {
    /// Creates a dimension id from any JSON-convertible value.
    pub fn new(id: impl Into<Value>) -> Self {
        Self(id.into())
    }

    /// Returns the `null` dimension id.
    pub fn null() -> Self {
        Self(Value::Null)
    }

    /// Returns `true` if this id is `null`.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Returns the id as it is written into documents and filters.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consumes the id, returning its JSON value.
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Returns the id as a string slice if it is a string id.
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }

    /// Returns a canonical, type-preserving string form.
    ///
    /// Used for cache keys, where `"1"` and `1` must not collide.
    pub fn canonical(&self) -> String {
        self.0.to_string()
    }
}

// serde_json values never hold NaN, so equality is reflexive.
impl Eq for DimensionId {}

impl Hash for DimensionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Debug for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DimensionId({})", self.0)
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<&str> for DimensionId {
    fn from(s: &str) -> Self {
        Self(Value::String(s.to_string()))
    }
}

impl From<String> for DimensionId {
    fn from(s: String) -> Self {
        Self(Value::String(s))
    }
}

impl From<i64> for DimensionId {
    fn from(n: i64) -> Self {
        Self(Value::from(n))
    }
}

impl From<i32> for DimensionId {
    fn from(n: i32) -> Self {
        Self(Value::from(n))
    }
}

impl From<u64> for DimensionId {
    fn from(n: u64) -> Self {
        Self(Value::from(n))
    }
}

impl From<bool> for DimensionId {
    fn from(b: bool) -> Self {
        Self(Value::Bool(b))
    }
}

impl From<Value> for DimensionId {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<&DimensionId> for DimensionId {
    fn from(id: &DimensionId) -> Self {
        id.clone()
    }
}

impl From<DimensionId> for Value {
    fn from(id: DimensionId) -> Self {
        id.0
    }
}
