// SPDX-License-Identifier: MIT

//! Helpers over `serde_json::Value` shared by executors, conditions and
//! event correlation

use serde_json::{Map, Value};

/// Compare two values after normalising scalar types.
///
/// Numbers, numeric strings and booleans given as `"true"`/`"false"` compare
/// by meaning rather than by representation, so `"42" == 42` and
/// `"true" == true`. Arrays and objects compare element-wise with the same
/// rule.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(_), Value::Number(_)) => numbers_equal(left, right),
        (Value::Number(_), Value::String(s)) | (Value::String(s), Value::Number(_)) => {
            let n = if left.is_number() { left } else { right };
            match (s.trim().parse::<f64>(), n.as_f64()) {
                (Ok(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => false,
            }
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            parse_bool(s) == Some(*b)
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| loose_eq(v, other)))
        }
        _ => false,
    }
}

fn numbers_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        return a == b;
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => false,
    }
}

/// Parse a case-insensitive `true`/`false` string
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Interpret a value as a boolean, accepting `"true"`/`"false"` strings
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool(s),
        _ => None,
    }
}

/// Numeric view of a value, accepting numeric strings
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Render a value for string interpolation
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Coerce a value into a node output mapping
pub fn into_output(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    }
}

/// Every key of `criteria` is present in `data` with a loosely equal value
pub fn subset_match(criteria: &Map<String, Value>, data: &Map<String, Value>) -> bool {
    criteria
        .iter()
        .all(|(k, expected)| data.get(k).is_some_and(|actual| loose_eq(expected, actual)))
}
