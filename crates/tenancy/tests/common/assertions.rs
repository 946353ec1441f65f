//! Assertion helpers for stored documents.

use serde_json::{Value, json};

use helios_tenancy::{DocumentInstance, Model};

/// Reads `(tenantId, k, v)` out of every document, sorted.
pub fn tenant_kv(docs: &[DocumentInstance]) -> Vec<(String, i64, i64)> {
    let mut rows: Vec<(String, i64, i64)> = docs
        .iter()
        .map(|doc| {
            (
                doc.get("tenantId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                doc.get("k").and_then(Value::as_i64).unwrap_or(-1),
                doc.get("v").and_then(Value::as_i64).unwrap_or(-1),
            )
        })
        .collect();
    rows.sort();
    rows
}

/// Returns every document of the unbound root of `model`, as `(tenantId, k, v)`.
pub async fn all_rows(model: &Model) -> Vec<(String, i64, i64)> {
    let docs = model
        .root()
        .find(json!({}))
        .exec()
        .await
        .expect("find succeeds")
        .documents();
    tenant_kv(&docs)
}

/// Builds the expected rows from string literals.
pub fn rows(expected: &[(&str, i64, i64)]) -> Vec<(String, i64, i64)> {
    let mut rows: Vec<(String, i64, i64)> = expected
        .iter()
        .map(|(tenant, k, v)| (tenant.to_string(), *k, *v))
        .collect();
    rows.sort();
    rows
}

/// Asserts that every document carries `key = expected`.
pub fn assert_all_scoped(docs: &[DocumentInstance], key: &str, expected: &Value) {
    for doc in docs {
        assert_eq!(
            doc.get(key),
            Some(expected),
            "document {:?} escaped {} = {}",
            doc.to_object(),
            key,
            expected
        );
    }
}
