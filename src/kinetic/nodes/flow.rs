// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use serde_json::json;

use crate::kinetic::workflow::condition::{self, is_truthy};
use crate::ndk::error::EngineError;
use crate::ndk::executor::{NodeExecutor, NodeKind, RunContext};
use crate::ndk::result::NodeResult;
use crate::ndk::value::{as_bool, into_output};

/// Branch point. Evaluates `result` (already resolved from a template) or a
/// condition `expression` against run state, and outputs `{result}` for the
/// orchestrator to pick labelled edges with.
pub struct ConditionExecutor;

#[async_trait]
impl NodeExecutor for ConditionExecutor {
    fn node_type(&self) -> &str {
        "condition"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Conditional
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let result = if let Some(value) = ctx.config.get("result") {
            as_bool(value).unwrap_or_else(|| is_truthy(value))
        } else if let Some(expression) = ctx.config_str("expression") {
            condition::check(expression, ctx)
                .map_err(|e| EngineError::node(ctx.node_id, e.to_string()))?
        } else {
            return Err(EngineError::node(
                ctx.node_id,
                "condition needs 'result' or 'expression' in config",
            ));
        };

        log::debug!("[{}] condition -> {}", ctx.node_id, result);
        Ok(NodeResult::success(into_output(json!({ "result": result }))))
    }
}

/// Jumps to `target` instead of following outgoing edges
pub struct GotoExecutor;

#[async_trait]
impl NodeExecutor for GotoExecutor {
    fn node_type(&self) -> &str {
        "goto"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let target = ctx.require_str("target")?.trim().to_string();
        Ok(NodeResult::success(into_output(json!({ "target": target }))).with_goto(target))
    }
}
