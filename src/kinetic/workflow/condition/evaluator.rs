// SPDX-License-Identifier: MIT

//! Condition expression evaluator

use serde_json::Value;

use super::ast::{CompareOp, Expression};
use crate::ndk::executor::RunContext;
use crate::ndk::expression::{parse_path, traverse, Scope};
use crate::ndk::value::{as_bool, as_f64, loose_eq};

/// Anything a condition can read paths from
pub trait Lookup {
    /// Value at `path`, or `None` when it does not resolve
    fn lookup_path(&self, path: &str) -> Option<Value>;
}

impl Lookup for Scope<'_> {
    fn lookup_path(&self, path: &str) -> Option<Value> {
        self.lookup(path).ok()
    }
}

impl Lookup for RunContext<'_> {
    fn lookup_path(&self, path: &str) -> Option<Value> {
        self.lookup(path).ok()
    }
}

/// Paths relative to a single value, as used when filtering items
impl Lookup for Value {
    fn lookup_path(&self, path: &str) -> Option<Value> {
        let segments = parse_path(path).ok()?;
        traverse(self, &segments, path).ok().cloned()
    }
}

/// Evaluate a condition. Paths that do not resolve read as null.
pub fn evaluate<L: Lookup + ?Sized>(expr: &Expression, source: &L) -> bool {
    match expr {
        Expression::Const(b) => *b,
        Expression::Truthy(path) => is_truthy(&source.lookup_path(path).unwrap_or(Value::Null)),
        Expression::Compare { path, op, operand } => {
            let left = source.lookup_path(path).unwrap_or(Value::Null);
            evaluate_compare(&left, *op, operand)
        }
        Expression::And(left, right) => evaluate(left, source) && evaluate(right, source),
        Expression::Or(left, right) => evaluate(left, source) || evaluate(right, source),
        Expression::Not(inner) => !evaluate(inner, source),
    }
}

fn evaluate_compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_eq(left, right),
        CompareOp::NotEq => !loose_eq(left, right),
        CompareOp::Gt => compare_numbers(left, right, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left, right, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left, right, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left, right, |a, b| a <= b),
        CompareOp::Contains => check_contains(left, right),
    }
}

fn compare_numbers<F>(left: &Value, right: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_f64(left), as_f64(right)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn check_contains(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| loose_eq(item, needle)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

/// Null, false, zero, empty strings and empty collections are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => as_bool(value).unwrap_or(!s.is_empty()),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::workflow::condition::parser::parse;
    use serde_json::json;

    fn eval(condition: &str, data: Value) -> bool {
        evaluate(&parse(condition).unwrap(), &data)
    }

    #[test]
    fn test_string_equality() {
        let data = json!({"intent": "search"});
        assert!(eval("intent == 'search'", data.clone()));
        assert!(!eval("intent == 'code'", data.clone()));
        assert!(eval("intent != 'code'", data));
    }

    #[test]
    fn test_number_comparison() {
        let data = json!({"score": 7.5, "count": "12"});

        assert!(eval("score > 5", data.clone()));
        assert!(!eval("score > 10", data.clone()));
        assert!(eval("score >= 7.5", data.clone()));
        assert!(eval("score < 10", data.clone()));
        assert!(eval("score <= 7.5", data.clone()));
        assert!(!eval("score <= 7", data.clone()));
        // numeric strings compare as numbers
        assert!(eval("count > 10", data.clone()));
        assert!(eval("count == 12", data));
    }

    #[test]
    fn test_boolean_comparison() {
        let data = json!({"is_draft": true, "approved": "false"});
        assert!(eval("is_draft == true", data.clone()));
        assert!(!eval("is_draft == false", data.clone()));
        assert!(eval("approved == false", data));
    }

    #[test]
    fn test_missing_field_is_null() {
        let data = json!({"result": null});
        assert!(eval("result == null", data.clone()));
        assert!(!eval("result != null", data.clone()));
        assert!(eval("missing == null", data.clone()));
        assert!(!eval("missing == 'value'", data.clone()));
        assert!(!eval("missing > 1", data));
    }

    #[test]
    fn test_contains() {
        let data = json!({
            "message": "hello world",
            "tags": ["bug", "urgent"],
            "ids": [1, 2, 3],
            "meta": {"owner": "ops"}
        });
        assert!(eval("message contains 'world'", data.clone()));
        assert!(!eval("message contains 'foo'", data.clone()));
        assert!(eval("tags contains 'urgent'", data.clone()));
        assert!(!eval("tags contains 'frontend'", data.clone()));
        assert!(eval("ids contains 2", data.clone()));
        assert!(eval("meta contains 'owner'", data));
    }

    #[test]
    fn test_logical_operators() {
        let data = json!({"type": "feature", "priority": 5});
        assert!(eval("type == 'bug' or priority > 3", data.clone()));
        assert!(!eval("type == 'bug' and priority > 3", data.clone()));
        assert!(eval("not (type == 'bug')", data.clone()));
        assert!(eval(
            "(type == 'bug' or type == 'feature') && priority == 5",
            data
        ));
    }

    #[test]
    fn test_truthy_paths() {
        let data = json!({
            "ok": true,
            "empty": "",
            "zero": 0,
            "items": [1],
            "flag": "FALSE"
        });
        assert!(eval("ok", data.clone()));
        assert!(!eval("empty", data.clone()));
        assert!(!eval("zero", data.clone()));
        assert!(eval("items", data.clone()));
        assert!(!eval("flag", data.clone()));
        assert!(!eval("missing", data));
    }

    #[test]
    fn test_nested_and_indexed_paths() {
        let data = json!({"result": {"data": [{"intent": "search"}]}});
        assert!(eval("result.data[0].intent == 'search'", data.clone()));
        assert!(!eval("result.data[3].intent == 'search'", data));
    }

    #[test]
    fn test_scope_lookup() {
        use crate::ndk::result::NodeResult;
        use serde_json::Map;
        use std::collections::HashMap;

        let mut steps = HashMap::new();
        steps.insert(
            "fetch".to_string(),
            NodeResult::success(crate::ndk::value::into_output(json!({"total": 40}))),
        );
        let input = json!({"limit": 30});
        let config = Map::new();
        let variables = Map::new();
        let scope = Scope {
            steps: &steps,
            input: &input,
            config: &config,
            variables: &variables,
        };

        assert!(evaluate(&parse("steps.fetch.total > 30").unwrap(), &scope));
        assert!(evaluate(
            &parse("steps.fetch.status == 'SUCCESS'").unwrap(),
            &scope
        ));
        assert!(evaluate(&parse("input.limit == 30").unwrap(), &scope));
        assert!(evaluate(
            &parse("steps.other.total == null").unwrap(),
            &scope
        ));
    }
}
