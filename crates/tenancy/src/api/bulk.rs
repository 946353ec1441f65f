//! Bulk write patching for bound models.

use serde_json::Value;

use crate::dimension::DimensionId;
use crate::error::ValidationError;
use crate::store::{BulkWriteOp, Document, UpdateModel, known_kind};

/// Update operators that cannot be forced to a literal id. An update using
/// one of them on the dimension key is rejected.
pub const FORBIDDEN_OPERATORS: [&str; 8] = [
    "$bit",
    "$currentDate",
    "$inc",
    "$min",
    "$max",
    "$mul",
    "$rename",
    "$unset",
];

/// Operators whose value for the dimension key is forced to the bound id.
const FORCED_OPERATORS: [&str; 2] = ["$set", "$setOnInsert"];

/// Pins every operation of a bulk write to `key = dimension_id`.
///
/// | Operation | Patched |
/// |-----------|---------|
/// | `insertOne` | document |
/// | `updateOne`, `updateMany` | filter, `$set` and `$setOnInsert` naming the key |
/// | `replaceOne` | filter and replacement |
/// | `deleteOne`, `deleteMany` | filter |
///
/// Unrecognized operations pass through untouched. Fails without returning
/// any operation if an update uses a forbidden operator on the key, or if an
/// [`BulkWriteOp::Other`] carries a known kind that would otherwise reach the
/// store unpatched.
pub fn modify_bulk_write_operations(
    operations: Vec<BulkWriteOp>,
    key: &str,
    dimension_id: &DimensionId,
) -> Result<Vec<BulkWriteOp>, ValidationError> {
    let id = dimension_id.as_value();
    operations
        .into_iter()
        .map(|operation| patch(operation, key, id))
        .collect()
}

fn patch(operation: BulkWriteOp, key: &str, id: &Value) -> Result<BulkWriteOp, ValidationError> {
    Ok(match operation {
        BulkWriteOp::InsertOne(mut model) => {
            pin(&mut model.document, key, id);
            BulkWriteOp::InsertOne(model)
        }
        BulkWriteOp::UpdateOne(model) => BulkWriteOp::UpdateOne(patch_update(model, key, id)?),
        BulkWriteOp::UpdateMany(model) => BulkWriteOp::UpdateMany(patch_update(model, key, id)?),
        BulkWriteOp::ReplaceOne(mut model) => {
            pin(&mut model.filter, key, id);
            pin(&mut model.replacement, key, id);
            BulkWriteOp::ReplaceOne(model)
        }
        BulkWriteOp::DeleteOne(mut model) => {
            pin(&mut model.filter, key, id);
            BulkWriteOp::DeleteOne(model)
        }
        BulkWriteOp::DeleteMany(mut model) => {
            pin(&mut model.filter, key, id);
            BulkWriteOp::DeleteMany(model)
        }
        BulkWriteOp::Other(value) => {
            if let Some(kind) = known_kind(&value) {
                tracing::warn!(kind, "rejected unparsed bulk operation");
                return Err(ValidationError::InvalidArguments {
                    operation: "bulkWrite".to_string(),
                    message: format!("malformed {kind} operation"),
                });
            }
            BulkWriteOp::Other(value)
        }
    })
}

fn patch_update(mut model: UpdateModel, key: &str, id: &Value) -> Result<UpdateModel, ValidationError> {
    let operators: Vec<String> = FORBIDDEN_OPERATORS
        .iter()
        .filter(|operator| names_key(&model.update, operator, key))
        .map(|operator| operator.to_string())
        .collect();
    if !operators.is_empty() {
        tracing::warn!(key, operators = ?operators, "rejected bulk update of the dimension key");
        return Err(ValidationError::ForbiddenDimensionModification {
            key: key.to_string(),
            operators,
        });
    }

    pin(&mut model.filter, key, id);
    for operator in FORCED_OPERATORS {
        if let Some(Value::Object(clause)) = model.update.get_mut(operator) {
            if clause.contains_key(key) {
                pin(clause, key, id);
            }
        }
    }
    Ok(model)
}

fn names_key(update: &Document, operator: &str, key: &str) -> bool {
    update
        .get(operator)
        .and_then(Value::as_object)
        .is_some_and(|clause| clause.contains_key(key))
}

fn pin(doc: &mut Document, key: &str, id: &Value) {
    doc.insert(key.to_string(), id.clone());
}
