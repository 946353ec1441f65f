//! Shared test infrastructure for the tenancy layer.
//!
//! Fixtures build connections and models the way applications do, the
//! recording store captures the exact calls that reach the document store,
//! and the assertion helpers compare stored documents without caring about
//! generated `_id` values.

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;
pub mod recording;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
pub use recording::*;
