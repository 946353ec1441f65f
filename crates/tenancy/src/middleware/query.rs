//! Query hooks.

use std::sync::Arc;

use serde_json::Value;

use crate::dimension::{DimensionId, DimensionOptions};
use crate::model::Query;
use crate::schema::QueryHook;

fn bound_id(query: &Query, options: &DimensionOptions) -> Option<DimensionId> {
    query.model()?.dimension_id(&options.dimension)
}

/// Pins the query conditions to the bound id, overwriting any caller value.
pub fn restrict_to_dimension(options: Arc<DimensionOptions>) -> QueryHook {
    Arc::new(move |query: &mut Query| {
        let Some(id) = bound_id(query, &options) else {
            return Ok(());
        };
        query
            .conditions_mut()
            .insert(options.dimension_id_key.clone(), id.into_value());
        tracing::trace!(
            op = %query.op(),
            key = %options.dimension_id_key,
            "restricted query to dimension"
        );
        Ok(())
    })
}

/// Forces the dimension key of an update or replacement to the bound id.
///
/// The key is set when the payload names it at the top level, when the
/// query replaces whole documents (`overwrite` or a replace operation), and
/// inside `$set` or `$setOnInsert` when those name it.
pub fn protect_against_dimension_overwrite(options: Arc<DimensionOptions>) -> QueryHook {
    Arc::new(move |query: &mut Query| {
        let Some(id) = bound_id(query, &options) else {
            return Ok(());
        };
        let key = &options.dimension_id_key;
        let value = id.into_value();
        let replaces = query.op().is_replacement() || query.options().overwrite;

        let Some(update) = query.update_mut() else {
            return Ok(());
        };
        if replaces || update.contains_key(key) {
            update.insert(key.clone(), value.clone());
        }
        for operator in ["$set", "$setOnInsert"] {
            if let Some(Value::Object(clause)) = update.get_mut(operator) {
                if clause.contains_key(key) {
                    clause.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{PluginOptions, resolve};
    use crate::model::{Connection, Model, QueryOp};
    use crate::plugin::TenancyPlugin;
    use crate::schema::Schema;
    use serde_json::json;

    fn options() -> Arc<DimensionOptions> {
        Arc::new(resolve(&PluginOptions::default()))
    }

    fn models() -> (Connection, Model, Model) {
        let connection = Connection::in_memory();
        let mut schema = Schema::from_json(json!({"k": "Number"})).unwrap();
        schema.plugin(&TenancyPlugin::default()).unwrap();
        let model = connection.register("Item", schema).unwrap();
        let bound = model.by_tenant("a").unwrap();
        (connection, model, bound)
    }

    #[test]
    fn test_restrict_overwrites_condition() {
        let (_connection, _model, bound) = models();
        let hook = restrict_to_dimension(options());
        let mut query = Query::new(QueryOp::Find)
            .with_model(&bound)
            .with_conditions(serde_json::from_value(json!({"tenantId": "b", "k": 1})).unwrap());
        hook(&mut query).unwrap();
        assert_eq!(query.conditions().get("tenantId"), Some(&json!("a")));
        assert_eq!(query.conditions().get("k"), Some(&json!(1)));
    }

    #[test]
    fn test_restrict_skips_unbound_model() {
        let (_connection, model, _bound) = models();
        let hook = restrict_to_dimension(options());
        let mut query = Query::new(QueryOp::Find).with_model(&model);
        hook(&mut query).unwrap();
        assert!(query.conditions().is_empty());

        let mut detached = Query::new(QueryOp::Find);
        hook(&mut detached).unwrap();
        assert!(detached.conditions().is_empty());
    }

    #[test]
    fn test_protect_top_level_key() {
        let (_connection, _model, bound) = models();
        let hook = protect_against_dimension_overwrite(options());
        let mut query = Query::new(QueryOp::UpdateOne)
            .with_model(&bound)
            .with_update(json!({"tenantId": "b", "k": 2}));
        hook(&mut query).unwrap();
        assert_eq!(
            Value::Object(query.update().unwrap().clone()),
            json!({"tenantId": "a", "k": 2})
        );
    }

    #[test]
    fn test_protect_operators() {
        let (_connection, _model, bound) = models();
        let hook = protect_against_dimension_overwrite(options());
        let mut query = Query::new(QueryOp::UpdateMany)
            .with_model(&bound)
            .with_update(json!({
                "$set": {"tenantId": "b"},
                "$setOnInsert": {"tenantId": "c"},
                "$inc": {"k": 1}
            }));
        hook(&mut query).unwrap();
        assert_eq!(
            Value::Object(query.update().unwrap().clone()),
            json!({
                "$set": {"tenantId": "a"},
                "$setOnInsert": {"tenantId": "a"},
                "$inc": {"k": 1}
            })
        );
    }

    #[test]
    fn test_protect_leaves_untouched_updates() {
        let (_connection, _model, bound) = models();
        let hook = protect_against_dimension_overwrite(options());
        let mut query = Query::new(QueryOp::UpdateOne)
            .with_model(&bound)
            .with_update(json!({"$set": {"k": 1}}));
        hook(&mut query).unwrap();
        assert_eq!(
            Value::Object(query.update().unwrap().clone()),
            json!({"$set": {"k": 1}})
        );
    }

    #[test]
    fn test_protect_replacements() {
        let (_connection, _model, bound) = models();
        let hook = protect_against_dimension_overwrite(options());

        let mut replace = Query::new(QueryOp::ReplaceOne)
            .with_model(&bound)
            .with_update(json!({"k": 3}));
        hook(&mut replace).unwrap();
        assert_eq!(replace.update().unwrap().get("tenantId"), Some(&json!("a")));

        let mut overwrite = Query::new(QueryOp::Update)
            .with_model(&bound)
            .with_update(json!({"k": 3}))
            .overwrite();
        hook(&mut overwrite).unwrap();
        assert_eq!(overwrite.update().unwrap().get("tenantId"), Some(&json!("a")));
    }
}
