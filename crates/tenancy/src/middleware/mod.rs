//! Pre hooks that keep queries and documents inside their dimension.
//!
//! Each hook reads the bound id from the model the query or document belongs
//! to. Unbound models have no id, so the hooks do nothing for them.

mod document;
mod query;

use std::sync::Arc;

use crate::dimension::DimensionOptions;
use crate::model::QueryOp;
use crate::schema::{DocumentEvent, Schema};

pub use document::add_dimension_id;
pub use query::{protect_against_dimension_overwrite, restrict_to_dimension};

/// Operations whose conditions are pinned to the bound id.
pub const RESTRICT_OPS: [QueryOp; 14] = QueryOp::ALL;

/// Operations whose update payload is protected from changing the id.
pub const PROTECT_OPS: [QueryOp; 6] = [
    QueryOp::FindOneAndReplace,
    QueryOp::FindOneAndUpdate,
    QueryOp::ReplaceOne,
    QueryOp::Update,
    QueryOp::UpdateOne,
    QueryOp::UpdateMany,
];

/// Registers the hooks of one dimension on `schema`.
pub fn install(schema: &mut Schema, options: &Arc<DimensionOptions>) {
    schema
        .pre_queries(&RESTRICT_OPS, restrict_to_dimension(options.clone()))
        .pre_queries(
            &PROTECT_OPS,
            protect_against_dimension_overwrite(options.clone()),
        )
        .pre_document(DocumentEvent::Validate, add_dimension_id(options.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{PluginOptions, resolve};

    #[test]
    fn test_install_registers_hooks() {
        let mut schema = Schema::new();
        install(&mut schema, &Arc::new(resolve(&PluginOptions::default())));

        assert_eq!(schema.query_hooks(QueryOp::Find).len(), 1);
        assert_eq!(schema.query_hooks(QueryOp::Count).len(), 1);
        assert_eq!(schema.query_hooks(QueryOp::UpdateOne).len(), 2);
        assert_eq!(schema.query_hooks(QueryOp::FindOneAndReplace).len(), 2);
        assert_eq!(schema.query_hooks(QueryOp::DeleteOne).len(), 1);
        assert_eq!(schema.document_hooks(DocumentEvent::Validate).len(), 1);
        assert!(schema.document_hooks(DocumentEvent::Save).is_empty());
    }

    #[test]
    fn test_protect_ops_all_carry_updates() {
        assert!(PROTECT_OPS.iter().all(QueryOp::has_update));
    }
}
