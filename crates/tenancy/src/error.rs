//! Error types for the tenancy layer.
//!
//! Errors are grouped by category: configuration problems surface while a
//! plugin is applied or a model is bound, validation problems surface while
//! arguments are inspected, and store errors come back from the document
//! store itself.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all tenancy operations.
#[derive(Error, Debug)]
pub enum TenancyError {
    /// Plugin, registry and model wiring errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Argument and payload validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Errors reported by the underlying document store
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while wiring dimensions onto schemas and models.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A dimension of the same name but different options was already applied.
    #[error("Dimension \"{dimension}\" already applied to model \"{model}\"")]
    DuplicateDimension { dimension: String, model: String },

    /// A registry lookup was attempted without a subject.
    #[error("No subject")]
    InvalidSubject,

    /// The dimension has not been applied to the model's schema.
    #[error("dimension \"{dimension}\" is not applied to model \"{model}\"")]
    UnknownDimension { dimension: String, model: String },

    /// No accessor or getter of the given name is registered.
    #[error("no tenancy method \"{method}\" on model \"{model}\"")]
    UnknownMethod { method: String, model: String },

    /// No static of the given name is registered on the model.
    #[error("no static \"{name}\" on model \"{model}\"")]
    UnknownStatic { name: String, model: String },

    /// No model of the given name is registered on the connection.
    #[error("model \"{name}\" is not registered")]
    UnknownModel { name: String },

    /// A model of the given name is already registered on the connection.
    #[error("model \"{name}\" is already registered")]
    DuplicateModel { name: String },

    /// The connection that owned the model has been dropped.
    #[error("connection for model \"{model}\" has been closed")]
    ConnectionClosed { model: String },

    /// A collection naming template could not be rendered.
    #[error("invalid collection template \"{template}\": {message}")]
    InvalidCollectionTemplate { template: String, message: String },
}

/// Errors raised while validating caller supplied arguments.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A bulk write update attempted to modify the dimension id key.
    #[error("Modification of {key} via bulkInsert update ({})", .operators.join(", "))]
    ForbiddenDimensionModification { key: String, operators: Vec<String> },

    /// The arguments passed to an operation have the wrong shape.
    #[error("invalid arguments for {operation}: {message}")]
    InvalidArguments { operation: String, message: String },

    /// A document failed schema validation.
    #[error("validation failed for path \"{path}\": {message}")]
    InvalidDocument { path: String, message: String },
}

/// Errors reported by a document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique index rejected the write.
    #[error("duplicate key in {collection} for index {index}")]
    DuplicateKey { collection: String, index: String },

    /// The filter, update or pipeline used an operator the store does not know.
    #[error("unsupported operator {operator}")]
    UnsupportedOperator { operator: String },

    /// The filter, update or pipeline is malformed.
    #[error("malformed {what}: {message}")]
    Malformed { what: String, message: String },

    /// The store cannot be reached.
    #[error("store unavailable ({backend}): {message}")]
    Unavailable { backend: String, message: String },

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Any other store failure.
    #[error("internal store error ({backend}): {message}")]
    Internal {
        backend: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TenancyError {
    fn from(err: serde_json::Error) -> Self {
        TenancyError::Store(StoreError::from(err))
    }
}

impl TenancyError {
    /// Returns `true` if this error was raised while wiring dimensions.
    pub fn is_config(&self) -> bool {
        matches!(self, TenancyError::Config(_))
    }

    /// Returns `true` if this error was raised while validating arguments.
    pub fn is_validation(&self) -> bool {
        matches!(self, TenancyError::Validation(_))
    }

    /// Returns `true` if a unique index rejected the write.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, TenancyError::Store(StoreError::DuplicateKey { .. }))
    }
}

/// Result type alias for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Result type alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;
