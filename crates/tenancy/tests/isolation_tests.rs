//! End-to-end isolation tests.
//!
//! Every operation issued through a bound model must only see and touch the
//! documents of its own tenant, whatever the caller passes for the id key.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::*;
use helios_tenancy::Connection;
use helios_tenancy::model::RemoveArgs;

// ============================================================================
// Read Tests
// ============================================================================

/// A bound find returns only the documents of its tenant.
#[tokio::test]
async fn test_find_is_scoped() {
    init_tracing();
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([{"tenantId": "a", "k": 1, "v": 1}, {"tenantId": "b", "k": 1, "v": 1}]),
    )
    .await
    .unwrap();

    let docs = model
        .by_tenant("a")
        .unwrap()
        .find(json!({}))
        .exec()
        .await
        .unwrap()
        .documents();

    assert_eq!(tenant_kv(&docs), rows(&[("a", 1, 1)]));
}

/// A caller supplied id in the conditions is overwritten.
#[tokio::test]
async fn test_find_ignores_foreign_tenant_condition() {
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([{"tenantId": "a", "k": 1}, {"tenantId": "b", "k": 2}]),
    )
    .await
    .unwrap();

    let docs = model
        .by_tenant("a")
        .unwrap()
        .find(json!({"tenantId": "b"}))
        .exec()
        .await
        .unwrap()
        .documents();

    assert_eq!(docs.len(), 1);
    assert_all_scoped(&docs, "tenantId", &json!("a"));
}

/// find_one and count only consider the bound tenant.
#[tokio::test]
async fn test_find_one_and_count_are_scoped() {
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([{"tenantId": 1, "k": 1}, {"tenantId": 1, "k": 2}, {"tenantId": 2, "k": 1}]),
    )
    .await
    .unwrap();

    let t1 = model.by_tenant(1).unwrap();
    let t2 = model.by_tenant(2).unwrap();

    let count1 = t1.count(json!({})).exec().await.unwrap().count();
    let count2 = t2.count(json!({})).exec().await.unwrap().count();
    assert_eq!(count1, Some(2));
    assert_eq!(count2, Some(1));

    let found = t2
        .find_one(json!({"k": 1}))
        .exec()
        .await
        .unwrap()
        .document()
        .unwrap();
    assert_eq!(found.get("tenantId"), Some(&json!(2)));
    assert_eq!(found.call_getter("getTenantId").unwrap(), Some(2.into()));
}

/// Sorting, skipping and limiting apply within the tenant.
#[tokio::test]
async fn test_find_options_within_tenant() {
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([
            {"tenantId": "a", "k": 3},
            {"tenantId": "a", "k": 1},
            {"tenantId": "a", "k": 2},
            {"tenantId": "b", "k": 0}
        ]),
    )
    .await
    .unwrap();

    let docs = model
        .by_tenant("a")
        .unwrap()
        .find(json!({}))
        .sort(json!({"k": 1}))
        .skip(1)
        .limit(1)
        .exec()
        .await
        .unwrap()
        .documents();

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("k"), Some(&json!(2)));
}

// ============================================================================
// Write Tests
// ============================================================================

/// Documents created through a bound model carry its id.
#[tokio::test]
async fn test_create_stamps_tenant() {
    let (_connection, model) = item_model();
    let created = model
        .by_tenant("a")
        .unwrap()
        .create(json!({"tenantId": "b", "k": 1}))
        .await
        .unwrap();

    assert_eq!(created[0].get("tenantId"), Some(&json!("a")));
    assert_eq!(all_rows(&model).await, rows(&[("a", 1, -1)]));
}

/// A document whose id was removed or reassigned before save is still
/// stored under the bound id.
#[tokio::test]
async fn test_save_restamps_tampered_document() {
    let (_connection, model) = item_model();
    let bound = model.by_tenant("a").unwrap();

    let mut removed = bound.new_document(json!({"k": 1})).unwrap();
    removed.unset("tenantId");
    removed.save().await.unwrap();

    let mut reassigned = bound.new_document(json!({"k": 2})).unwrap();
    reassigned.set("tenantId", "b").unwrap();
    reassigned.save().await.unwrap();

    assert_eq!(all_rows(&model).await, rows(&[("a", 1, -1), ("a", 2, -1)]));
}

/// Saving an existing document keeps it in its tenant.
#[tokio::test]
async fn test_resave_keeps_tenant() {
    let (_connection, model) = item_model();
    let bound = model.by_tenant("a").unwrap();
    let mut doc = bound.create(json!({"k": 1, "v": 1})).await.unwrap().remove(0);

    doc.set("v", 2).unwrap();
    doc.set("tenantId", "b").unwrap();
    doc.save().await.unwrap();

    assert_eq!(all_rows(&model).await, rows(&[("a", 1, 2)]));
}

/// Updates through a bound model never reach another tenant's documents.
#[tokio::test]
async fn test_update_many_is_scoped() {
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([{"tenantId": "a", "k": 1, "v": 1}, {"tenantId": "b", "k": 1, "v": 1}]),
    )
    .await
    .unwrap();

    let outcome = model
        .by_tenant("a")
        .unwrap()
        .update_many(json!({"k": 1}), json!({"$set": {"v": 5}}))
        .exec()
        .await
        .unwrap();

    assert_eq!(outcome.update_result().unwrap().matched_count, 1);
    assert_eq!(all_rows(&model).await, rows(&[("a", 1, 5), ("b", 1, 1)]));
}

/// The scenario from the plugin's documentation: an update that tries to
/// move a document to another tenant leaves it where it was.
#[tokio::test]
async fn test_update_cannot_move_document() {
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([{"tenantId": "a", "k": 1, "v": 1}, {"tenantId": "b", "k": 1, "v": 1}]),
    )
    .await
    .unwrap();

    let bound = model.by_tenant("a").unwrap();
    let found = bound.find(json!({})).exec().await.unwrap().documents();
    assert_eq!(tenant_kv(&found), rows(&[("a", 1, 1)]));

    bound
        .update_one(json!({"k": 1}), json!({"tenantId": "b"}))
        .exec()
        .await
        .unwrap();

    assert_eq!(all_rows(&model).await, rows(&[("a", 1, 1), ("b", 1, 1)]));
}

/// Upserts through a bound model insert into the bound tenant.
#[tokio::test]
async fn test_upsert_lands_in_tenant() {
    let (_connection, model) = item_model();

    model
        .by_tenant("a")
        .unwrap()
        .update_one(json!({"k": 9}), json!({"$set": {"v": 9}}))
        .upsert()
        .exec()
        .await
        .unwrap();

    assert_eq!(all_rows(&model).await, rows(&[("a", 9, 9)]));
}

/// find_one_and_update matches and returns only tenant documents.
#[tokio::test]
async fn test_find_one_and_update_is_scoped() {
    let (_connection, model) = item_model();
    seed(&model, json!([{"tenantId": "b", "k": 1, "v": 1}]))
        .await
        .unwrap();

    let missing = model
        .by_tenant("a")
        .unwrap()
        .find_one_and_update(json!({"k": 1}), json!({"$set": {"v": 2}}))
        .return_new()
        .exec()
        .await
        .unwrap()
        .document();

    assert!(missing.is_none());
    assert_eq!(all_rows(&model).await, rows(&[("b", 1, 1)]));
}

/// insert_many stamps every document and hands back bound instances.
#[tokio::test]
async fn test_insert_many_stamps_and_rewraps() {
    let (_connection, model) = item_model();
    let bound = model.by_tenant("a").unwrap();

    let inserted = bound
        .insert_many(
            json!([{"k": 1}, {"k": 2, "tenantId": "b"}]),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(inserted.len(), 2);
    for doc in &inserted {
        assert!(doc.model().ptr_eq(&bound));
        assert_eq!(doc.call_getter("getTenantId").unwrap(), Some("a".into()));
        assert!(doc.id().is_some());
    }
    assert_eq!(all_rows(&model).await, rows(&[("a", 1, -1), ("a", 2, -1)]));
}

/// A single document passed to insert_many is treated like a list of one.
#[tokio::test]
async fn test_insert_many_single_document() {
    let (_connection, model) = item_model();
    let inserted = model
        .by_tenant("a")
        .unwrap()
        .insert_many(json!({"k": 1}), None, None)
        .await
        .unwrap();

    assert_eq!(inserted.len(), 1);
    assert_eq!(inserted[0].get("tenantId"), Some(&json!("a")));
}

// ============================================================================
// Delete Tests
// ============================================================================

/// delete_one and delete_many only remove tenant documents.
#[tokio::test]
async fn test_deletes_are_scoped() {
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([
            {"tenantId": "a", "k": 1},
            {"tenantId": "a", "k": 2},
            {"tenantId": "b", "k": 1},
            {"tenantId": "b", "k": 2}
        ]),
    )
    .await
    .unwrap();
    let bound = model.by_tenant("a").unwrap();

    let one = bound
        .delete_one(json!({"k": 1, "tenantId": "b"}), None)
        .await
        .unwrap();
    assert_eq!(one.deleted_count, 1);

    let many = bound.delete_many(json!({}), None, None).await.unwrap();
    assert_eq!(many.deleted_count, 1);

    assert_eq!(all_rows(&model).await, rows(&[("b", 1, -1), ("b", 2, -1)]));
}

/// Every call shape of remove stays inside the tenant.
#[tokio::test]
async fn test_remove_call_shapes() {
    let (_connection, model) = item_model();
    seed(
        &model,
        json!([
            {"tenantId": "a", "k": 1},
            {"tenantId": "a", "k": 2},
            {"tenantId": "b", "k": 1}
        ]),
    )
    .await
    .unwrap();
    let bound = model.by_tenant("a").unwrap();

    let removed = bound.remove(json!({"k": 1}).into()).await.unwrap();
    assert_eq!(removed.deleted_count, 1);

    let seen = Arc::new(parking_lot::Mutex::new(None));
    let sink = seen.clone();
    bound
        .remove(RemoveArgs::Callback(helios_tenancy::model::callback::<helios_tenancy::store::DeleteResult, _>(
            move |result| {
                *sink.lock() = Some(result.map(|r| r.deleted_count).ok());
            },
        )))
        .await
        .unwrap();
    assert_eq!(*seen.lock(), Some(Some(1)));

    let removed = bound.remove(RemoveArgs::None).await.unwrap();
    assert_eq!(removed.deleted_count, 0);

    assert_eq!(all_rows(&model).await, rows(&[("b", 1, -1)]));
}

/// find_one_and_delete cannot reach another tenant's document.
#[tokio::test]
async fn test_find_one_and_delete_is_scoped() {
    let (_connection, model) = item_model();
    seed(&model, json!([{"tenantId": "b", "k": 1}])).await.unwrap();

    let deleted = model
        .by_tenant("a")
        .unwrap()
        .find_one_and_delete(json!({"k": 1}))
        .exec()
        .await
        .unwrap()
        .document();

    assert!(deleted.is_none());
    assert_eq!(all_rows(&model).await, rows(&[("b", 1, -1)]));
}

// ============================================================================
// Unbound Model Tests
// ============================================================================

/// The unbound model sees every tenant.
#[tokio::test]
async fn test_unbound_model_is_unfiltered() {
    let connection = Connection::in_memory();
    let model = connection
        .register("Item", tenant_schema(json!({"k": "Number"})))
        .unwrap();
    seed(
        &model,
        json!([{"tenantId": "a", "k": 1}, {"tenantId": "b", "k": 1}]),
    )
    .await
    .unwrap();

    let count = model.count(json!({"k": 1})).exec().await.unwrap().count();
    assert_eq!(count, Some(2));
    assert!(!model.is_bound());
    assert_eq!(model.call_getter("getTenantId").unwrap(), None);
}
