//! Bulk write operation models.
//!
//! The wire shape is the one document databases use for bulk writes: each
//! operation is an object with a single key naming the kind, for example
//! `{"updateOne": {"filter": {...}, "update": {...}}}`. Fields the tenancy
//! layer does not interpret (`upsert`, `collation`, `arrayFilters`, ...) are
//! kept in `extra` and passed through untouched.
//!
//! An object naming one of the known kinds must parse as that kind; only
//! unknown kinds fall back to [`BulkWriteOp::Other`].

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Document;

/// Wire names of the operation kinds this layer interprets.
pub const KNOWN_KINDS: [&str; 6] = [
    "insertOne",
    "updateOne",
    "updateMany",
    "replaceOne",
    "deleteOne",
    "deleteMany",
];

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkWriteOp {
    /// Insert a single document.
    InsertOne(InsertOneModel),
    /// Update the first matching document.
    UpdateOne(UpdateModel),
    /// Update every matching document.
    UpdateMany(UpdateModel),
    /// Replace the first matching document.
    ReplaceOne(ReplaceOneModel),
    /// Delete the first matching document.
    DeleteOne(DeleteModel),
    /// Delete every matching document.
    DeleteMany(DeleteModel),
    /// Any operation kind this layer does not recognize, kept verbatim.
    #[serde(untagged)]
    Other(Value),
}

/// Payload of an `insertOne` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertOneModel {
    /// The document to insert.
    pub document: Document,
    /// Uninterpreted fields.
    #[serde(flatten)]
    pub extra: Document,
}

/// Payload of `updateOne` and `updateMany` operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateModel {
    /// Selects the documents to update. Absent or `null` means every document.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filter: Document,
    /// Update operator document.
    pub update: Document,
    /// Uninterpreted fields (`upsert`, `arrayFilters`, ...).
    #[serde(flatten)]
    pub extra: Document,
}

/// Payload of a `replaceOne` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplaceOneModel {
    /// Selects the document to replace.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filter: Document,
    /// The replacement document.
    pub replacement: Document,
    /// Uninterpreted fields.
    #[serde(flatten)]
    pub extra: Document,
}

/// Payload of `deleteOne` and `deleteMany` operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteModel {
    /// Selects the documents to delete.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filter: Document,
    /// Uninterpreted fields.
    #[serde(flatten)]
    pub extra: Document,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Document, D::Error> {
    Ok(Option::<Document>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum KnownOp {
    InsertOne(InsertOneModel),
    UpdateOne(UpdateModel),
    UpdateMany(UpdateModel),
    ReplaceOne(ReplaceOneModel),
    DeleteOne(DeleteModel),
    DeleteMany(DeleteModel),
}

impl From<KnownOp> for BulkWriteOp {
    fn from(op: KnownOp) -> Self {
        match op {
            KnownOp::InsertOne(m) => BulkWriteOp::InsertOne(m),
            KnownOp::UpdateOne(m) => BulkWriteOp::UpdateOne(m),
            KnownOp::UpdateMany(m) => BulkWriteOp::UpdateMany(m),
            KnownOp::ReplaceOne(m) => BulkWriteOp::ReplaceOne(m),
            KnownOp::DeleteOne(m) => BulkWriteOp::DeleteOne(m),
            KnownOp::DeleteMany(m) => BulkWriteOp::DeleteMany(m),
        }
    }
}

impl<'de> Deserialize<'de> for BulkWriteOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        BulkWriteOp::from_value(value).map_err(de::Error::custom)
    }
}

/// Returns the known kind `value` names, if any.
///
/// An object naming a known kind next to other keys still counts, so it is
/// rejected rather than treated as unknown.
pub fn known_kind(value: &Value) -> Option<&'static str> {
    let object = value.as_object()?;
    KNOWN_KINDS
        .iter()
        .copied()
        .find(|kind| object.contains_key(*kind))
}

impl BulkWriteOp {
    /// Parses a list of operations from their JSON wire shape.
    pub fn list_from_json(value: Value) -> Result<Vec<BulkWriteOp>, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Parses one operation.
    ///
    /// Fails when `value` names a known kind but its payload does not have
    /// that kind's shape, for example an update given as a pipeline array.
    pub fn from_value(value: Value) -> Result<BulkWriteOp, serde_json::Error> {
        match known_kind(&value) {
            Some(_) => serde_json::from_value::<KnownOp>(value).map(BulkWriteOp::from),
            None => Ok(BulkWriteOp::Other(value)),
        }
    }

    /// Returns the wire name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BulkWriteOp::InsertOne(_) => "insertOne",
            BulkWriteOp::UpdateOne(_) => "updateOne",
            BulkWriteOp::UpdateMany(_) => "updateMany",
            BulkWriteOp::ReplaceOne(_) => "replaceOne",
            BulkWriteOp::DeleteOne(_) => "deleteOne",
            BulkWriteOp::DeleteMany(_) => "deleteMany",
            BulkWriteOp::Other(_) => "other",
        }
    }

    /// Returns the `upsert` flag of update and replace operations.
    pub fn upsert(&self) -> bool {
        let extra = match self {
            BulkWriteOp::UpdateOne(m) | BulkWriteOp::UpdateMany(m) => &m.extra,
            BulkWriteOp::ReplaceOne(m) => &m.extra,
            _ => return false,
        };
        extra.get("upsert").and_then(Value::as_bool).unwrap_or(false)
    }
}
