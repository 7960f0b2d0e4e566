// SPDX-License-Identifier: MIT

//! Nodes that pause the run until something outside the engine answers
//!
//! Human tasks and approvals are resumed directly by their id. Event waits
//! are correlated against inbound events by name, scope and criteria.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::args;
use crate::ndk::error::EngineError;
use crate::ndk::executor::{NodeExecutor, RunContext};
use crate::ndk::result::{NodeResult, WaitCondition};
use crate::ndk::value::into_output;

fn action_id(configured: Option<String>) -> String {
    configured
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[derive(Debug, Deserialize)]
struct HumanTaskArgs {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    assignee: Value,
    #[serde(default)]
    description: Option<String>,
}

/// Hands a task to a person and waits for them to complete it
pub struct HumanTaskExecutor;

#[async_trait]
impl NodeExecutor for HumanTaskExecutor {
    fn node_type(&self) -> &str {
        "human_task"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let args: HumanTaskArgs = args(ctx)?;
        let task_id = action_id(args.task_id);

        let mut output = into_output(json!({
            "task_id": task_id,
            "title": args.title,
            "assignee": args.assignee,
        }));
        if let Some(description) = args.description {
            output.insert("description".to_string(), Value::String(description));
        }

        log::info!(
            "[{}] [{}] waiting on task {}",
            ctx.run_id,
            ctx.node_id,
            task_id
        );
        Ok(NodeResult::paused(
            output,
            WaitCondition::Direct { action_id: task_id },
        ))
    }
}

#[derive(Debug, Deserialize)]
struct ApprovalArgs {
    #[serde(default)]
    approval_id: Option<String>,
    #[serde(default)]
    approvers: Vec<Value>,
}

pub struct ApprovalExecutor;

#[async_trait]
impl NodeExecutor for ApprovalExecutor {
    fn node_type(&self) -> &str {
        "approval"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let args: ApprovalArgs = args(ctx)?;
        let approval_id = action_id(args.approval_id);

        let output = into_output(json!({
            "approval_id": approval_id,
            "approvers": args.approvers,
        }));
        log::info!(
            "[{}] [{}] waiting on approval {}",
            ctx.run_id,
            ctx.node_id,
            approval_id
        );
        Ok(NodeResult::paused(
            output,
            WaitCondition::Direct {
                action_id: approval_id,
            },
        ))
    }
}

#[derive(Debug, Deserialize)]
struct WaitForEventArgs {
    event: String,
    #[serde(default)]
    criteria: Map<String, Value>,
    #[serde(default)]
    scope: Option<String>,
}

/// Waits for an inbound event named `event` whose data contains `criteria`
pub struct WaitForEventExecutor;

#[async_trait]
impl NodeExecutor for WaitForEventExecutor {
    fn node_type(&self) -> &str {
        "wait_for_event"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let args: WaitForEventArgs = args(ctx)?;
        let event = args.event.trim().to_string();
        if event.is_empty() {
            return Err(EngineError::node(ctx.node_id, "'event' must not be empty"));
        }
        let scope = args.scope.filter(|s| !s.trim().is_empty());

        let output = into_output(json!({
            "event": event,
            "criteria": args.criteria,
            "scope": scope,
        }));
        log::info!(
            "[{}] [{}] waiting for event {}",
            ctx.run_id,
            ctx.node_id,
            event
        );
        Ok(NodeResult::paused(
            output,
            WaitCondition::Event {
                event,
                scope_id: scope,
                criteria: args.criteria,
            },
        ))
    }
}
