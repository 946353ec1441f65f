//! Aggregation pipeline evaluation for in-process stores.
//!
//! Supports `$match`, `$sort`, `$skip`, `$limit`, `$project`, `$addFields`
//! (and its alias `$set`), `$group` and `$count`.

use serde_json::{Number, Value};

use crate::error::StoreResult;

use super::Document;
use super::filter::{get_path, malformed, matches, remove_path, set_path, sort_documents, sort_order, values_equal};

/// Runs `pipeline` over `docs`.
pub(crate) fn run(mut docs: Vec<Document>, pipeline: &[Value]) -> StoreResult<Vec<Document>> {
    for stage in pipeline {
        let (name, spec) = stage
            .as_object()
            .filter(|s| s.len() == 1)
            .and_then(|s| s.iter().next())
            .ok_or_else(|| malformed("pipeline", "each stage must be an object with one field"))?;
        docs = match name.as_str() {
            "$match" => {
                let filter = as_document(name, spec)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => {
                sort_documents(&mut docs, as_document(name, spec)?);
                docs
            }
            "$skip" => docs.into_iter().skip(as_count(name, spec)?).collect(),
            "$limit" => docs.into_iter().take(as_count(name, spec)?).collect(),
            "$project" => project(docs, as_document(name, spec)?)?,
            "$addFields" | "$set" => add_fields(docs, as_document(name, spec)?)?,
            "$group" => group(docs, as_document(name, spec)?)?,
            "$count" => {
                let field = spec
                    .as_str()
                    .ok_or_else(|| malformed("pipeline", "$count expects a field name"))?;
                let mut out = Document::new();
                out.insert(field.to_string(), Value::from(docs.len() as u64));
                vec![out]
            }
            other => {
                return Err(crate::error::StoreError::UnsupportedOperator {
                    operator: other.to_string(),
                });
            }
        };
    }
    Ok(docs)
}

fn as_document<'a>(stage: &str, spec: &'a Value) -> StoreResult<&'a Document> {
    spec.as_object()
        .ok_or_else(|| malformed("pipeline", format!("{stage} expects an object")))
}

fn as_count(stage: &str, spec: &Value) -> StoreResult<usize> {
    spec.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| malformed("pipeline", format!("{stage} expects a non-negative integer")))
}

/// Evaluates an expression: `"$path"` reads a field, objects are evaluated
/// field by field, everything else is a literal.
fn evaluate(expr: &Value, doc: &Document) -> Value {
    match expr {
        Value::String(s) if s.starts_with('$') => {
            get_path(doc, &s[1..]).cloned().unwrap_or(Value::Null)
        }
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), evaluate(v, doc)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn is_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

fn project(docs: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let inclusion = spec
        .iter()
        .any(|(k, v)| k != "_id" && is_flag(v) != Some(false));
    let keep_id = spec.get("_id").and_then(is_flag).unwrap_or(true);

    docs.into_iter()
        .map(|doc| {
            if !inclusion {
                let mut out = doc;
                for (path, _) in spec.iter().filter(|(_, v)| is_flag(v) == Some(false)) {
                    remove_path(&mut out, path);
                }
                return Ok(out);
            }
            let mut out = Document::new();
            if keep_id {
                if let Some(id) = doc.get("_id") {
                    out.insert("_id".to_string(), id.clone());
                }
            }
            for (path, value) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
                match is_flag(value) {
                    Some(true) => {
                        if let Some(found) = get_path(&doc, path) {
                            set_path(&mut out, path, found.clone())?;
                        }
                    }
                    Some(false) => {}
                    None => set_path(&mut out, path, evaluate(value, &doc))?,
                }
            }
            Ok(out)
        })
        .collect()
}

fn add_fields(docs: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    docs.into_iter()
        .map(|mut doc| {
            for (path, expr) in spec {
                let value = evaluate(expr, &doc);
                set_path(&mut doc, path, value)?;
            }
            Ok(doc)
        })
        .collect()
}

fn group(docs: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    let key_expr = spec
        .get("_id")
        .ok_or_else(|| malformed("pipeline", "$group requires an _id"))?;

    let mut groups: Vec<(Value, Vec<Document>)> = Vec::new();
    for doc in docs {
        let key = evaluate(key_expr, &doc);
        match groups.iter_mut().find(|(k, _)| values_equal(k, &key)) {
            Some((_, members)) => members.push(doc),
            None => groups.push((key, vec![doc])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut out = Document::new();
            out.insert("_id".to_string(), key);
            for (field, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
                out.insert(field.clone(), accumulate(field, accumulator, &members)?);
            }
            Ok(out)
        })
        .collect()
}

fn accumulate(field: &str, accumulator: &Value, members: &[Document]) -> StoreResult<Value> {
    let (op, expr) = accumulator
        .as_object()
        .filter(|a| a.len() == 1)
        .and_then(|a| a.iter().next())
        .ok_or_else(|| malformed("pipeline", format!("accumulator for {field} must have one operator")))?;
    let values = || members.iter().map(|doc| evaluate(expr, doc));

    let result = match op.as_str() {
        "$sum" => sum(values()),
        "$avg" => {
            let numbers: Vec<f64> = values().filter_map(|v| v.as_f64()).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "$min" => values()
            .filter(|v| !v.is_null())
            .min_by(|a, b| sort_order(Some(a), Some(b)))
            .unwrap_or(Value::Null),
        "$max" => values()
            .filter(|v| !v.is_null())
            .max_by(|a, b| sort_order(Some(a), Some(b)))
            .unwrap_or(Value::Null),
        "$first" => values().next().unwrap_or(Value::Null),
        "$last" => values().last().unwrap_or(Value::Null),
        "$push" => Value::Array(values().collect()),
        "$addToSet" => {
            let mut set: Vec<Value> = Vec::new();
            for value in values() {
                if !set.iter().any(|v| values_equal(v, &value)) {
                    set.push(value);
                }
            }
            Value::Array(set)
        }
        "$count" => Value::from(members.len() as u64),
        other => {
            return Err(crate::error::StoreError::UnsupportedOperator {
                operator: other.to_string(),
            });
        }
    };
    Ok(result)
}

fn sum(values: impl Iterator<Item = Value>) -> Value {
    let mut int_total: i64 = 0;
    let mut float_total: f64 = 0.0;
    let mut is_float = false;
    for value in values {
        let Value::Number(n) = value else { continue };
        match n.as_i64() {
            Some(i) if !is_float => match int_total.checked_add(i) {
                Some(total) => int_total = total,
                None => {
                    is_float = true;
                    float_total = int_total as f64 + i as f64;
                }
            },
            _ => {
                if !is_float {
                    is_float = true;
                    float_total = int_total as f64;
                }
                float_total += n.as_f64().unwrap_or(0.0);
            }
        }
    }
    if is_float {
        float(float_total)
    } else {
        Value::from(int_total)
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs(value: Value) -> Vec<Document> {
        serde_json::from_value(value).unwrap()
    }

    fn stages(value: Value) -> Vec<Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_match_group_sort() {
        let input = docs(json!([
            {"t": "a", "n": 1},
            {"t": "a", "n": 2},
            {"t": "b", "n": 5}
        ]));
        let out = run(
            input,
            &stages(json!([
                {"$match": {"n": {"$gte": 1}}},
                {"$group": {"_id": "$t", "total": {"$sum": "$n"}, "count": {"$sum": 1}}},
                {"$sort": {"_id": 1}}
            ])),
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(out).unwrap(),
            json!([
                {"_id": "a", "total": 3, "count": 2},
                {"_id": "b", "total": 5, "count": 1}
            ])
        );
    }

    #[test]
    fn test_project_skip_limit_count() {
        let input = docs(json!([
            {"_id": 1, "k": "x", "v": 1},
            {"_id": 2, "k": "y", "v": 2},
            {"_id": 3, "k": "z", "v": 3}
        ]));
        let out = run(
            input.clone(),
            &stages(json!([{"$skip": 1}, {"$limit": 1}, {"$project": {"_id": 0, "k": 1}}])),
        )
        .unwrap();
        assert_eq!(serde_json::to_value(out).unwrap(), json!([{"k": "y"}]));

        let out = run(input, &stages(json!([{"$count": "total"}]))).unwrap();
        assert_eq!(serde_json::to_value(out).unwrap(), json!([{"total": 3}]));
    }

    #[test]
    fn test_accumulators() {
        let input = docs(json!([{"n": 1}, {"n": 4}, {"n": 2}]));
        let out = run(
            input,
            &stages(json!([{"$group": {
                "_id": null,
                "avg": {"$avg": "$n"},
                "min": {"$min": "$n"},
                "max": {"$max": "$n"},
                "all": {"$push": "$n"}
            }}])),
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(out).unwrap(),
            json!([{"_id": null, "avg": 7.0 / 3.0, "min": 1, "max": 4, "all": [1, 4, 2]}])
        );
    }

    #[test]
    fn test_unknown_stage() {
        let err = run(Vec::new(), &stages(json!([{"$lookup": {}}]))).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StoreError::UnsupportedOperator { .. }
        ));
    }
}
