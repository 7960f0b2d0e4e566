// SPDX-License-Identifier: MIT

//! Data-shaping nodes: variables, mapping, logging, parsing, filtering

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::args;
use crate::kinetic::workflow::condition::{self, is_truthy};
use crate::ndk::error::EngineError;
use crate::ndk::executor::{NodeExecutor, RunContext};
use crate::ndk::result::{NodeResult, ReducerType};
use crate::ndk::value::{into_output, loose_eq, value_to_text};

#[derive(Debug, Deserialize)]
struct SetArgs {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    reducer: Option<String>,
    /// Several overwrites at once
    #[serde(default)]
    variables: Option<Map<String, Value>>,
}

/// Writes run variables. Either a single `name`/`value`/`reducer` or a
/// `variables` mapping whose entries all overwrite.
pub struct SetExecutor;

#[async_trait]
impl NodeExecutor for SetExecutor {
    fn node_type(&self) -> &str {
        "set"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let args: SetArgs = args(ctx)?;
        let reducer = match args.reducer.as_deref() {
            None => ReducerType::default(),
            Some(name) => ReducerType::parse(name).ok_or_else(|| {
                EngineError::node(ctx.node_id, format!("unknown reducer '{}'", name))
            })?,
        };

        let mut written = Map::new();
        let mut result_vars = Vec::new();
        if let Some(name) = args.name.filter(|n| !n.trim().is_empty()) {
            written.insert(name.clone(), args.value.clone());
            result_vars.push((name, args.value, reducer));
        }
        for (name, value) in args.variables.unwrap_or_default() {
            written.insert(name.clone(), value.clone());
            result_vars.push((name, value, ReducerType::Overwrite));
        }
        if result_vars.is_empty() {
            return Err(EngineError::node(
                ctx.node_id,
                "set needs 'name' or 'variables' in config",
            ));
        }

        let mut result = NodeResult::success(written);
        for (name, value, reducer) in result_vars {
            log::debug!("[{}] set {} ({:?})", ctx.node_id, name, reducer);
            result = result.with_variable(name, value, reducer);
        }
        Ok(result)
    }
}

/// Emits the resolved `fields` mapping as output
pub struct MapExecutor;

#[async_trait]
impl NodeExecutor for MapExecutor {
    fn node_type(&self) -> &str {
        "map"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let fields = match ctx.config.get("fields") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(fields)) => fields.clone(),
            Some(_) => {
                return Err(EngineError::node(ctx.node_id, "'fields' must be a mapping"));
            }
        };
        Ok(NodeResult::success(fields))
    }
}

/// Logs `message` (or the input) and passes the input through
pub struct DebugExecutor;

#[async_trait]
impl NodeExecutor for DebugExecutor {
    fn node_type(&self) -> &str {
        "debug"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let message = match ctx.config.get("message") {
            Some(value) => value_to_text(value),
            None => value_to_text(&ctx.input),
        };
        log::info!("[{}] [{}] {}", ctx.run_id, ctx.node_id, message);
        Ok(NodeResult::success(into_output(ctx.input.clone())))
    }
}

#[derive(Debug, Deserialize)]
struct ParseArgs {
    #[serde(default)]
    text: Option<String>,
    #[serde(default = "default_format")]
    format: String,
}

fn default_format() -> String {
    "json".to_string()
}

/// Parses `text`, or a string input, as JSON or YAML
pub struct ParseExecutor;

#[async_trait]
impl NodeExecutor for ParseExecutor {
    fn node_type(&self) -> &str {
        "parse"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let args: ParseArgs = args(ctx)?;
        let text = match (args.text, &ctx.input) {
            (Some(text), _) => text,
            (None, Value::String(text)) => text.clone(),
            (None, _) => {
                return Err(EngineError::node(
                    ctx.node_id,
                    "nothing to parse: set 'text' or pass a string input",
                ));
            }
        };

        let parsed = match args.format.trim().to_ascii_lowercase().as_str() {
            "json" => serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str::<Value>(&text).map_err(|e| e.to_string()),
            other => {
                return Err(EngineError::node(
                    ctx.node_id,
                    format!("unsupported format '{}'", other),
                ));
            }
        };

        match parsed {
            Ok(value) => Ok(NodeResult::success(into_output(value))),
            Err(e) => {
                log::warn!("[{}] malformed {} input: {}", ctx.node_id, args.format, e);
                Ok(NodeResult::failed(format!(
                    "malformed {}: {}",
                    args.format, e
                )))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FilterArgs {
    #[serde(default)]
    items: Option<Vec<Value>>,
    #[serde(default, rename = "where")]
    condition: Option<String>,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    equals: Option<Value>,
}

/// Keeps the items matching a `where` condition, or whose `field` equals
/// `equals` (truthy when `equals` is absent). Output is `{items, count}`.
pub struct FilterExecutor;

impl FilterExecutor {
    fn items(
        ctx: &RunContext<'_>,
        configured: Option<Vec<Value>>,
    ) -> Result<Vec<Value>, EngineError> {
        if let Some(items) = configured {
            return Ok(items);
        }
        match &ctx.input {
            Value::Array(items) => Ok(items.clone()),
            Value::Object(obj) => match obj.get("items") {
                Some(Value::Array(items)) => Ok(items.clone()),
                _ => Err(EngineError::node(ctx.node_id, "input has no 'items' array")),
            },
            _ => Err(EngineError::node(ctx.node_id, "no items to filter")),
        }
    }
}

#[async_trait]
impl NodeExecutor for FilterExecutor {
    fn node_type(&self) -> &str {
        "filter"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let args: FilterArgs = args(ctx)?;
        let items = Self::items(ctx, args.items)?;

        let kept: Vec<Value> = if let Some(expr) = args.condition.as_deref() {
            let parsed =
                condition::parse(expr).map_err(|e| EngineError::node(ctx.node_id, e.to_string()))?;
            items
                .into_iter()
                .filter(|item| condition::evaluate(&parsed, item))
                .collect()
        } else if let Some(field) = args.field.as_deref() {
            items
                .into_iter()
                .filter(|item| match (item.get(field), &args.equals) {
                    (Some(actual), Some(expected)) => loose_eq(actual, expected),
                    (Some(actual), None) => is_truthy(actual),
                    (None, Some(Value::Null)) => true,
                    (None, _) => false,
                })
                .collect()
        } else {
            return Err(EngineError::node(
                ctx.node_id,
                "filter needs 'where' or 'field' in config",
            ));
        };

        let count = kept.len();
        Ok(NodeResult::success(into_output(json!({
            "items": kept,
            "count": count,
        }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::nodes::testing::Fixture;
    use crate::ndk::result::NodeStatus;

    #[tokio::test]
    async fn test_set_single_with_reducer() {
        let fixture = Fixture::new();
        let ctx = fixture.context(
            json!({"name": "seen", "value": "a", "reducer": "append"}),
            Value::Null,
        );
        let result = SetExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.output["seen"], json!("a"));
        assert_eq!(result.variables.len(), 1);
        assert_eq!(result.variables[0].reducer, ReducerType::Append);
    }

    #[tokio::test]
    async fn test_set_mapping() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"variables": {"a": 1, "b": true}}), Value::Null);
        let result = SetExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.variables.len(), 2);
        assert!(result
            .variables
            .iter()
            .all(|v| v.reducer == ReducerType::Overwrite));
    }

    #[tokio::test]
    async fn test_set_rejects_unknown_reducer_and_empty_config() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"name": "x", "reducer": "sum"}), Value::Null);
        let err = SetExecutor.execute(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("unknown reducer"));

        let ctx = fixture.context(json!({}), Value::Null);
        assert!(SetExecutor.execute(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_map_outputs_fields() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"fields": {"total": 12, "ok": true}}), Value::Null);
        let result = MapExecutor.execute(&ctx).await.unwrap();
        assert_eq!(
            Value::Object(result.output),
            json!({"total": 12, "ok": true})
        );

        let ctx = fixture.context(json!({}), Value::Null);
        assert!(MapExecutor.execute(&ctx).await.unwrap().output.is_empty());
    }

    #[tokio::test]
    async fn test_debug_passes_input_through() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"message": "hello"}), json!({"k": "v"}));
        let result = DebugExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.output["k"], json!("v"));
    }

    #[tokio::test]
    async fn test_parse_json_and_yaml() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"text": r#"{"a": [1, 2]}"#}), Value::Null);
        let result = ParseExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.output["a"], json!([1, 2]));

        let ctx = fixture.context(json!({"format": "yaml"}), json!("name: ada\nage: 36\n"));
        let result = ParseExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.output["name"], json!("ada"));
        assert_eq!(result.output["age"], json!(36));
    }

    #[tokio::test]
    async fn test_parse_malformed_fails_node() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"text": "{not json"}), Value::Null);
        let result = ParseExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.status, NodeStatus::Failed);
        assert!(result.error.unwrap().starts_with("malformed json"));

        let ctx = fixture.context(json!({"text": "a", "format": "toml"}), Value::Null);
        assert!(ParseExecutor.execute(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_filter_by_condition() {
        let fixture = Fixture::new();
        let ctx = fixture.context(
            json!({"where": "amount > 10 and status == 'open'"}),
            json!({"items": [
                {"id": 1, "amount": 5, "status": "open"},
                {"id": 2, "amount": "50", "status": "open"},
                {"id": 3, "amount": 70, "status": "closed"}
            ]}),
        );
        let result = FilterExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.output["count"], json!(1));
        assert_eq!(result.output["items"][0]["id"], json!(2));
    }

    #[tokio::test]
    async fn test_filter_by_field() {
        let fixture = Fixture::new();
        let items = json!([
            {"tag": "a", "on": true},
            {"tag": "b", "on": false},
            {"tag": "a"}
        ]);
        let ctx = fixture.context(
            json!({"items": items, "field": "tag", "equals": "a"}),
            Value::Null,
        );
        let result = FilterExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.output["count"], json!(2));

        let ctx = fixture.context(json!({"field": "on"}), items);
        let result = FilterExecutor.execute(&ctx).await.unwrap();
        assert_eq!(result.output["count"], json!(1));
    }

    #[tokio::test]
    async fn test_filter_without_items_or_rule() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"field": "x"}), json!("text"));
        assert!(FilterExecutor.execute(&ctx).await.is_err());

        let ctx = fixture.context(json!({"items": []}), Value::Null);
        assert!(FilterExecutor.execute(&ctx).await.is_err());
    }
}
