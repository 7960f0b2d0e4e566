// SPDX-License-Identifier: MIT

//! Node results and the side-channel directives an executor may attach

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved output key a node sets to redirect execution to another node
pub const GOTO_KEY: &str = "$goto";

/// Outcome of a single node execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Success,
    Failed,
    Paused,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Success => "SUCCESS",
            NodeStatus::Failed => "FAILED",
            NodeStatus::Paused => "PAUSED",
        }
    }
}

/// What a suspending node is waiting for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitCondition {
    /// Resumed explicitly by id (human task, approval)
    Direct { action_id: String },
    /// Resumed by an inbound event whose data matches `criteria`
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope_id: Option<String>,
        #[serde(default)]
        criteria: Map<String, Value>,
    },
}

/// Strategy for merging a value into a run variable
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    /// Replace the value (default)
    #[default]
    Overwrite,
    /// Append to array
    Append,
    /// Keep maximum value
    Max,
    /// Keep minimum value
    Min,
    /// Shallow merge objects
    Merge,
}

impl ReducerType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "overwrite" | "set" => Some(Self::Overwrite),
            "append" => Some(Self::Append),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

/// A variable write requested by a SET-style node
#[derive(Debug, Clone, PartialEq)]
pub struct VariableUpdate {
    pub name: String,
    pub value: Value,
    pub reducer: ReducerType,
}

/// Result of executing one node
///
/// `wait` and `variables` are directives for the orchestrator and are never
/// persisted into `steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    #[serde(default)]
    pub output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub wait: Option<WaitCondition>,
    #[serde(skip)]
    pub variables: Vec<VariableUpdate>,
}

impl NodeResult {
    pub fn success(output: Map<String, Value>) -> Self {
        Self {
            status: NodeStatus::Success,
            output,
            error: None,
            wait: None,
            variables: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failed,
            output: Map::new(),
            error: Some(error.into()),
            wait: None,
            variables: Vec::new(),
        }
    }

    pub fn paused(output: Map<String, Value>, wait: WaitCondition) -> Self {
        Self {
            status: NodeStatus::Paused,
            output,
            error: None,
            wait: Some(wait),
            variables: Vec::new(),
        }
    }

    /// Redirect execution to `target` instead of following edges
    pub fn with_goto(mut self, target: impl Into<String>) -> Self {
        self.output
            .insert(GOTO_KEY.to_string(), Value::String(target.into()));
        self
    }

    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        value: Value,
        reducer: ReducerType,
    ) -> Self {
        self.variables.push(VariableUpdate {
            name: name.into(),
            value,
            reducer,
        });
        self
    }

    /// Remove and return the goto target, if the node set one
    pub fn take_goto(&mut self) -> Option<String> {
        match self.output.remove(GOTO_KEY)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    /// Project the persisted part of this result (`{status, output, error}`)
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(
            "status".to_string(),
            Value::String(self.status.as_str().to_string()),
        );
        obj.insert("output".to_string(), Value::Object(self.output.clone()));
        obj.insert(
            "error".to_string(),
            self.error.clone().map(Value::String).unwrap_or(Value::Null),
        );
        Value::Object(obj)
    }
}
