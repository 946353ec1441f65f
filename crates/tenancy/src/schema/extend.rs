//! Schema extension for one dimension.
//!
//! Applying a dimension adds its id field and makes unique indexes unique
//! per dimension id instead of globally, unless the index opts out with
//! `preserveUniqueKey`.

use super::{FieldDef, FieldType, IndexSpec, Schema};

/// Adds the dimension id field `key` and compounds unique indexes with it.
pub fn extend(schema: &mut Schema, key: &str, field_type: FieldType, required: bool) {
    let mut field = FieldDef::new(field_type).indexed();
    field.required = required;
    schema.add(key, field);
    compound_indexes(schema, key);
}

/// Prepends `key` to every unique index that does not preserve its key.
///
/// Schema-level unique indexes are rewritten in place and lose their
/// `preserveUniqueKey` option. Field-level unique indexes are replaced by a
/// schema-level `{key: 1, field: 1}` index carrying the field's index
/// options.
pub fn compound_indexes(schema: &mut Schema, key: &str) {
    for index in schema.indexes_mut() {
        if index.is_unique() && index.options.preserve_unique_key != Some(true) {
            index.prepend_key(key);
            tracing::debug!(index = %index.name(), "compounded schema level unique index");
        }
        index.options.preserve_unique_key = None;
    }

    let mut compounded = Vec::new();
    for (name, field) in schema.fields_mut() {
        if !field.is_unique() || field.preserves_unique_key() {
            continue;
        }
        let mut options = field.index_options().cloned().unwrap_or_default();
        options.unique = Some(true);
        options.preserve_unique_key = None;
        if options.sparse.is_none() {
            options.sparse = field.sparse;
        }

        field.index = None;
        field.unique = None;

        let index = IndexSpec::new(vec![(key.to_string(), 1), (name.clone(), 1)], options);
        tracing::debug!(field = %name, index = %index.name(), "compounded field level unique index");
        compounded.push(index);
    }
    schema.indexes_mut().extend(compounded);
}
