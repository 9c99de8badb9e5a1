//! Structural deep equality for query result rows.
//!
//! Rows coming back from the data source are arbitrary JSON trees. Two
//! results are the same when they are structurally equal:
//!
//! - sequences compare element-wise, in order
//! - mappings compare by key set and per-key value, ignoring key order
//! - numbers compare by numeric value (`1`, `1.0` and `1u64` are equal)
//! - everything else compares by value
//!
//! `serde_json::Value`'s own `PartialEq` distinguishes integer and float
//! representations of the same number, which would turn a re-encoded but
//! unchanged result into a spurious update.

use serde_json::{Map, Number, Value};

/// Compare two result sequences row by row.
pub fn rows_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_equal(x, y))
}

/// Recursive structural comparison of two JSON values.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => rows_equal(x, y),
        (Value::Object(x), Value::Object(y)) => maps_equal(x, y),
        _ => false,
    }
}

fn maps_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().all(|(key, x)| match b.get(key) {
        Some(y) => deep_equal(x, y),
        None => false,
    })
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    canonical_number(a) == canonical_number(b)
}

/// One representation per numeric value: integral floats become integers.
fn canonical_number(n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n.clone();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Number::from(f as i64)
        }
        Some(f) if f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64 => Number::from(f as u64),
        _ => n.clone(),
    }
}

/// Rewrite `value` so that deep-equal values are also `==` and serialize to
/// the same text: numbers canonical, object keys sorted.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|key| (key.clone(), canonicalize(&map[key])))
                    .collect(),
            )
        }
        other => other.clone(),
    }
}
