//! Filter matching, ordering and update operators for in-process stores.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::{StoreError, StoreResult};

use super::Document;

/// Resolves a dotted path inside a document.
pub(crate) fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate objects.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
            Ok(())
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if entry.is_null() {
                *entry = Value::Object(Document::new());
            }
            match entry {
                Value::Object(map) => set_path(map, rest, value),
                _ => Err(malformed(
                    "update",
                    format!("cannot create field '{rest}' in non-object '{head}'"),
                )),
            }
        }
    }
}

/// Removes the value at a dotted path, returning it.
pub(crate) fn remove_path(doc: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head)? {
            Value::Object(map) => remove_path(map, rest),
            _ => None,
        },
    }
}

pub(crate) fn malformed(what: &str, message: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        what: what.to_string(),
        message: message.into(),
    }
}

fn unsupported(operator: &str) -> StoreError {
    StoreError::UnsupportedOperator {
        operator: operator.to_string(),
    }
}

/// Returns `true` if every key of `doc` is an operator (`$`-prefixed).
pub(crate) fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

/// Returns `true` if `doc` matches the query `filter`.
pub(crate) fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" | "$nor" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                if key == "$or" { any } else { !any }
            }
            op if op.starts_with('$') => return Err(unsupported(op)),
            path => matches_condition(get_path(doc, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, value: &'a Value) -> StoreResult<Vec<&'a Document>> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed("filter", format!("{operator} expects an array")))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| malformed("filter", format!("{operator} clauses must be objects")))
        })
        .collect()
}

fn matches_condition(actual: Option<&Value>, condition: &Value) -> StoreResult<bool> {
    if let Value::Object(ops) = condition {
        if is_operator_document(ops) {
            for (op, operand) in ops {
                if !matches_operator(actual, op, operand)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    Ok(equals_or_contains(actual, condition))
}

fn matches_operator(actual: Option<&Value>, op: &str, operand: &Value) -> StoreResult<bool> {
    let result = match op {
        "$eq" => equals_or_contains(actual, operand),
        "$ne" => !equals_or_contains(actual, operand),
        "$in" => in_list(actual, operand)?,
        "$nin" => !in_list(actual, operand)?,
        "$gt" => compares(actual, operand, |o| o == Ordering::Greater),
        "$gte" => compares(actual, operand, |o| o != Ordering::Less),
        "$lt" => compares(actual, operand, |o| o == Ordering::Less),
        "$lte" => compares(actual, operand, |o| o != Ordering::Greater),
        "$exists" => actual.is_some() == truthy(operand),
        "$not" => !matches_condition(actual, operand)?,
        "$size" => match (actual, operand.as_u64()) {
            (Some(Value::Array(items)), Some(size)) => items.len() as u64 == size,
            _ => false,
        },
        other => return Err(unsupported(other)),
    };
    Ok(result)
}

fn in_list(actual: Option<&Value>, operand: &Value) -> StoreResult<bool> {
    let candidates = operand
        .as_array()
        .ok_or_else(|| malformed("filter", "$in/$nin expects an array"))?;
    Ok(candidates.iter().any(|c| equals_or_contains(actual, c)))
}

fn compares(actual: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_same_type(item, operand).is_some_and(&accept)),
        Some(value) => compare_same_type(value, operand).is_some_and(accept),
        None => false,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn equals_or_contains(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

/// Equality with numeric values compared by magnitude (`1 == 1.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((kx, vx), (ky, vy))| kx == ky && values_equal(vx, vy))
        }
        _ => a == b,
    }
}

fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn compare_numbers(x: &Number, y: &Number) -> Option<Ordering> {
    match (x.as_i64(), y.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for sorting and for `$min`/`$max`.
pub(crate) fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_same_type(x, y)
            .unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Compares two documents by a `{field: 1 | -1}` specification.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (path, direction) in sort {
        let ordering = sort_order(get_path(a, path), get_path(b, path));
        let ordering = if direction.as_i64() == Some(-1) {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sorts documents in place by a `{field: 1 | -1}` specification.
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| compare_documents(a, b, sort));
}

/// Builds the seed document of an upsert from the equality clauses of a filter.
pub(crate) fn seed_from_filter(filter: &Document) -> StoreResult<Document> {
    let mut seed = Document::new();
    for (key, condition) in filter {
        if key == "$and" {
            for clause in clauses(key, condition)? {
                for (k, v) in seed_from_filter(clause)? {
                    seed.insert(k, v);
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }
        match condition {
            Value::Object(ops) if is_operator_document(ops) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(&mut seed, key, value.clone())?;
                }
            }
            value => set_path(&mut seed, key, value.clone())?,
        }
    }
    Ok(seed)
}

/// Applies an update operator document to `doc`.
///
/// `$setOnInsert` only takes effect when `is_insert` is set.
pub(crate) fn apply_update(doc: &mut Document, update: &Document, is_insert: bool) -> StoreResult<()> {
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| malformed("update", format!("{op} expects an object")))?;
        for (path, value) in fields {
            apply_operator(doc, op, path, value, is_insert)?;
        }
    }
    Ok(())
}

fn apply_operator(
    doc: &mut Document,
    op: &str,
    path: &str,
    value: &Value,
    is_insert: bool,
) -> StoreResult<()> {
    match op {
        "$set" => set_path(doc, path, value.clone()),
        "$setOnInsert" => {
            if is_insert {
                set_path(doc, path, value.clone())?;
            }
            Ok(())
        }
        "$unset" => {
            remove_path(doc, path);
            Ok(())
        }
        "$inc" => {
            let next = match get_path(doc, path) {
                Some(current) => arithmetic(current, value, i64::checked_add, |a, b| a + b)?,
                None => value.clone(),
            };
            set_path(doc, path, next)
        }
        "$mul" => {
            let next = match get_path(doc, path) {
                Some(current) => arithmetic(current, value, i64::checked_mul, |a, b| a * b)?,
                None => arithmetic(&Value::from(0), value, i64::checked_mul, |a, b| a * b)?,
            };
            set_path(doc, path, next)
        }
        "$min" | "$max" => {
            let wanted = if op == "$min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let current = get_path(doc, path);
            if current.is_none() || sort_order(Some(value), current) == wanted {
                set_path(doc, path, value.clone())?;
            }
            Ok(())
        }
        "$rename" => {
            let target = value
                .as_str()
                .ok_or_else(|| malformed("update", "$rename target must be a string"))?;
            if let Some(moved) = remove_path(doc, path) {
                set_path(doc, target, moved)?;
            }
            Ok(())
        }
        "$currentDate" => set_path(doc, path, Value::String(chrono::Utc::now().to_rfc3339())),
        "$push" => {
            let items: Vec<Value> = match value {
                Value::Object(spec) if spec.contains_key("$each") => spec
                    .get("$each")
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| malformed("update", "$each expects an array"))?,
                other => vec![other.clone()],
            };
            match get_path(doc, path).cloned() {
                None | Some(Value::Null) => set_path(doc, path, Value::Array(items)),
                Some(Value::Array(mut existing)) => {
                    existing.extend(items);
                    set_path(doc, path, Value::Array(existing))
                }
                Some(_) => Err(malformed("update", format!("$push target '{path}' is not an array"))),
            }
        }
        other => Err(unsupported(other)),
    }
}

fn arithmetic(
    current: &Value,
    operand: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> StoreResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (current, operand) else {
        return Err(malformed("update", "arithmetic on a non-numeric value"));
    };
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = int_op(x, y) {
            return Ok(Value::from(result));
        }
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(malformed("update", "number out of range"));
    };
    Number::from_f64(float_op(x, y))
        .map(Value::Number)
        .ok_or_else(|| malformed("update", "arithmetic produced a non-finite number"))
}
