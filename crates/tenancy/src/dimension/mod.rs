//! Dimensions: options, identifiers and the per-subject registry.
//!
//! A *dimension* is one independent axis of isolation. The default dimension
//! is `tenant`; a schema may carry several (for example `tenant` and
//! `customer`), each with its own id field and accessor.

mod id;
mod options;
mod registry;

pub use id::DimensionId;
pub use options::{
    CollectionContext, CollectionNamer, CollectionNaming, DEFAULT_DIMENSION, DimensionOptions,
    PluginOptions, resolve,
};
pub use registry::{DimensionEntry, DimensionRegistry, DimensionSubject, Dimensions, dimensions};
