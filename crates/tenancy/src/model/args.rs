//! Argument shapes accepted by model operations.

use serde_json::Value;

use crate::error::ValidationError;
use crate::store::{DeleteResult, Document};

use super::Callback;

/// Converts a JSON value into a document. `null` becomes an empty document.
pub fn into_document(value: Value, operation: &str) -> Result<Document, ValidationError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Document::new()),
        other => Err(ValidationError::InvalidArguments {
            operation: operation.to_string(),
            message: format!("expected an object, got {other}"),
        }),
    }
}

/// One document or a list of documents.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertDocs {
    /// A single document.
    One(Value),
    /// Several documents.
    Many(Vec<Value>),
}

impl InsertDocs {
    pub(crate) fn into_documents(self, operation: &str) -> Result<Vec<Document>, ValidationError> {
        match self {
            InsertDocs::One(value) => Ok(vec![into_document(value, operation)?]),
            InsertDocs::Many(values) => values
                .into_iter()
                .map(|value| into_document(value, operation))
                .collect(),
        }
    }
}

impl From<Value> for InsertDocs {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => InsertDocs::Many(items),
            other => InsertDocs::One(other),
        }
    }
}

impl From<Vec<Value>> for InsertDocs {
    fn from(values: Vec<Value>) -> Self {
        InsertDocs::Many(values)
    }
}

/// The call shapes of `remove`.
pub enum RemoveArgs {
    /// No arguments: conditions stay absent.
    None,
    /// Only a callback: conditions default to `{}`.
    Callback(Callback<DeleteResult>),
    /// Only conditions.
    Conditions(Value),
    /// Conditions followed by a callback.
    ConditionsWithCallback(Value, Callback<DeleteResult>),
}

impl RemoveArgs {
    /// Splits the arguments into conditions and callback.
    pub fn into_parts(self) -> (Option<Value>, Option<Callback<DeleteResult>>) {
        match self {
            RemoveArgs::None => (None, None),
            RemoveArgs::Callback(cb) => (Some(Value::Object(Document::new())), Some(cb)),
            RemoveArgs::Conditions(conditions) => (Some(conditions), None),
            RemoveArgs::ConditionsWithCallback(conditions, cb) => (Some(conditions), Some(cb)),
        }
    }
}

impl From<Value> for RemoveArgs {
    fn from(conditions: Value) -> Self {
        RemoveArgs::Conditions(conditions)
    }
}
