// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::ndk::error::{EngineError, ResolveError};
use crate::ndk::expression::{self, Scope};
use crate::ndk::result::NodeResult;

/// How the orchestrator treats a node's outgoing edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Follows every outgoing edge
    Standard,
    /// Follows only edges whose label matches `output.result`
    Conditional,
}

/// Everything an executor may read while running one node
#[derive(Debug)]
pub struct RunContext<'a> {
    pub run_id: &'a str,
    pub flow_id: &'a str,
    pub node_id: &'a str,
    /// Node config with every template already resolved
    pub config: Map<String, Value>,
    /// Output of the most recent predecessor, or the run input
    pub input: Value,
    pub steps: &'a HashMap<String, NodeResult>,
    pub variables: &'a Map<String, Value>,
}

impl<'a> RunContext<'a> {
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            steps: self.steps,
            input: &self.input,
            config: &self.config,
            variables: self.variables,
        }
    }

    /// Look up a path against this node's view of run state
    pub fn lookup(&self, path: &str) -> Result<Value, ResolveError> {
        self.scope().lookup(path)
    }

    /// Resolve a template late, e.g. inside an executor loop
    pub fn resolve(&self, template: &str) -> Result<Value, ResolveError> {
        expression::resolve(template, &self.scope())
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Required string config value
    pub fn require_str(&self, key: &str) -> Result<&str, EngineError> {
        self.config_str(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| EngineError::node(self.node_id, format!("missing '{}' in config", key)))
    }
}

/// Behaviour bound to a node type.
///
/// Execution is a function from context to result as far as the orchestrator
/// is concerned. Any side effect (HTTP, email, database) belongs to the
/// executor and must be safe to retry.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Node type this executor is registered under by default
    fn node_type(&self) -> &str;

    fn kind(&self) -> NodeKind {
        NodeKind::Standard
    }

    /// Execute one node. An `Err` fails the node exactly like
    /// `NodeResult::failed`.
    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context<'a>(
        steps: &'a HashMap<String, NodeResult>,
        variables: &'a Map<String, Value>,
        config: Value,
    ) -> RunContext<'a> {
        RunContext {
            run_id: "run-1",
            flow_id: "flow-1",
            node_id: "node-1",
            config: crate::ndk::value::into_output(config),
            input: json!({"name": "Ada"}),
            steps,
            variables,
        }
    }

    #[test]
    fn test_require_str() {
        let steps = HashMap::new();
        let variables = Map::new();
        let ctx = context(
            &steps,
            &variables,
            json!({"url": "https://x.test", "blank": " "}),
        );

        assert_eq!(ctx.require_str("url").unwrap(), "https://x.test");
        assert!(ctx.require_str("blank").is_err());
        let err = ctx.require_str("missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Node 'node-1' failed: missing 'missing' in config"
        );
    }

    #[test]
    fn test_late_resolution_sees_input_and_config() {
        let steps = HashMap::new();
        let variables = Map::new();
        let ctx = context(&steps, &variables, json!({"greeting": "hi"}));

        assert_eq!(
            ctx.resolve("{{ config.greeting }} {{ input.name }}").unwrap(),
            json!("hi Ada")
        );
        assert_eq!(ctx.lookup("input.name").unwrap(), json!("Ada"));
    }
}
