//! Bound model machinery.
//!
//! - [`bind`]: derives models pinned to a dimension id and resolves
//!   accessors through the [`ModelCache`].
//! - [`DimensionAwareDb`]: the `db` handle of bound models.
//! - [`parse_aggregate_arguments`] and [`modify_bulk_write_operations`]:
//!   normalizers applied by the batch operations.

mod aggregate;
mod aware_db;
mod binder;
mod bulk;
mod cache;

pub use aggregate::{AggregateArg, ParsedAggregate, parse_aggregate_arguments};
pub use aware_db::{Db, DimensionAwareDb};
pub use binder::{Binding, bind};
pub(crate) use binder::resolve_accessor;
pub use bulk::{FORBIDDEN_OPERATORS, modify_bulk_write_operations};
pub use cache::ModelCache;
