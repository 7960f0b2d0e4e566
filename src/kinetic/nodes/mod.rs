// SPDX-License-Identifier: MIT

//! Built-in node executors
//!
//! | family       | types                                                     |
//! |--------------|-----------------------------------------------------------|
//! | pass-through | `trigger`, `manual`, `webhook`                            |
//! | side effect  | `http`, `http_request`                                    |
//! | transform    | `set`, `map`, `debug`, `log`, `parse`, `json_parse`,      |
//! |              | `filter`                                                  |
//! | control      | `condition`, `if`, `goto`                                 |
//! | suspending   | `human_task`, `human`, `approval`, `wait_for_event`,      |
//! |              | `wait_event`, `automation`                                |

pub mod flow;
pub mod http;
pub mod suspend;
pub mod transform;
pub mod trigger;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::kinetic::config::EngineConfig;
use crate::kinetic::workflow::registry::ExecutorRegistry;
use crate::ndk::error::EngineError;
use crate::ndk::executor::{NodeExecutor, RunContext};

/// Registry holding every built-in executor under its names
pub fn builtin_registry(config: &EngineConfig) -> Result<ExecutorRegistry, EngineError> {
    let mut registry = ExecutorRegistry::new();

    register(
        &mut registry,
        Arc::new(trigger::TriggerExecutor),
        &["manual", "webhook"],
    );
    register(
        &mut registry,
        Arc::new(http::HttpExecutor::new(config.http_timeout)?),
        &["http_request"],
    );
    register(&mut registry, Arc::new(transform::SetExecutor), &[]);
    register(&mut registry, Arc::new(transform::MapExecutor), &[]);
    register(&mut registry, Arc::new(transform::DebugExecutor), &["log"]);
    register(
        &mut registry,
        Arc::new(transform::ParseExecutor),
        &["json_parse"],
    );
    register(&mut registry, Arc::new(transform::FilterExecutor), &[]);
    register(&mut registry, Arc::new(flow::ConditionExecutor), &["if"]);
    register(&mut registry, Arc::new(flow::GotoExecutor), &[]);
    register(
        &mut registry,
        Arc::new(suspend::HumanTaskExecutor),
        &["human"],
    );
    register(&mut registry, Arc::new(suspend::ApprovalExecutor), &[]);
    register(
        &mut registry,
        Arc::new(suspend::WaitForEventExecutor),
        &["wait_event", "automation"],
    );

    log::debug!("Built-in node types: {:?}", registry.types());
    Ok(registry)
}

fn register(registry: &mut ExecutorRegistry, executor: Arc<dyn NodeExecutor>, aliases: &[&str]) {
    for alias in aliases {
        registry.register_alias(alias, executor.clone());
    }
    registry.register(executor);
}

/// Deserialize a node's resolved config into its typed arguments
pub(crate) fn args<T: DeserializeOwned>(ctx: &RunContext<'_>) -> Result<T, EngineError> {
    serde_json::from_value(Value::Object(ctx.config.clone()))
        .map_err(|e| EngineError::node(ctx.node_id, format!("invalid config: {}", e)))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ndk::result::NodeResult;
    use serde_json::Map;
    use std::collections::HashMap;

    /// Owned state a test `RunContext` can borrow from
    pub struct Fixture {
        pub steps: HashMap<String, NodeResult>,
        pub variables: Map<String, Value>,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                steps: HashMap::new(),
                variables: Map::new(),
            }
        }

        pub fn context(&self, config: Value, input: Value) -> RunContext<'_> {
            RunContext {
                run_id: "run-1",
                flow_id: "flow-1",
                node_id: "node-1",
                config: crate::ndk::value::into_output(config),
                input,
                steps: &self.steps,
                variables: &self.variables,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_names() {
        let registry = builtin_registry(&EngineConfig::default()).unwrap();
        for name in [
            "trigger",
            "manual",
            "webhook",
            "http",
            "http_request",
            "set",
            "map",
            "debug",
            "log",
            "parse",
            "json_parse",
            "filter",
            "condition",
            "if",
            "goto",
            "human_task",
            "human",
            "approval",
            "wait_for_event",
            "wait_event",
            "automation",
        ] {
            assert!(registry.get(name).is_some(), "{} not registered", name);
        }
        assert_eq!(registry.get("IF").unwrap().node_type(), "condition");
        assert_eq!(
            registry.get("automation").unwrap().node_type(),
            "wait_for_event"
        );
    }
}
