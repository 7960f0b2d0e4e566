// SPDX-License-Identifier: MIT

//! Per-run state and its status machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

use crate::ndk::error::EngineError;
use crate::ndk::result::{NodeResult, ReducerType, VariableUpdate};
use crate::ndk::value::as_f64;

/// Lifecycle status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Terminated,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Paused => "PAUSED",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Terminated => "TERMINATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Terminated
        )
    }

    /// `RUNNING -> {PAUSED, COMPLETED, FAILED, TERMINATED}`,
    /// `PAUSED -> {RUNNING, TERMINATED}`
    pub fn can_transition(&self, to: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, to),
            (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Terminated)
                | (Paused, Running)
                | (Paused, Terminated)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node and message of the failure that ended a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub node_id: String,
    pub message: String,
}

/// Everything needed to continue a run from where it stopped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub flow_id: String,
    pub status: RunStatus,
    pub input: Value,
    /// Last result per node id
    pub steps: HashMap<String, NodeResult>,
    pub variables: Map<String, Value>,
    /// Nodes waiting for the cursor to reach them
    #[serde(default)]
    pub activated: BTreeSet<String>,
    /// Index into the plan order of the next node to consider
    #[serde(default)]
    pub cursor: usize,
    /// Node ids in execution order, one entry per attempt
    #[serde(default)]
    pub trail: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, flow_id: impl Into<String>, input: Value) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            flow_id: flow_id.into(),
            status: RunStatus::Running,
            input,
            steps: HashMap::new(),
            variables: Map::new(),
            activated: BTreeSet::new(),
            cursor: 0,
            trail: Vec::new(),
            paused_at: None,
            wait_id: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to`, rejecting transitions the status machine forbids
    pub fn transition(&mut self, to: RunStatus) -> Result<(), EngineError> {
        if !self.status.can_transition(to) {
            return Err(EngineError::InvalidTransition {
                run_id: self.run_id.clone(),
                from: self.status,
                to,
            });
        }
        log::info!("Run {}: {} -> {}", self.run_id, self.status, to);
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Store a node's result, replacing any earlier attempt
    pub fn record(&mut self, node_id: &str, result: NodeResult) {
        self.steps.insert(node_id.to_string(), result);
        self.trail.push(node_id.to_string());
        self.updated_at = Utc::now();
    }

    pub fn executions(&self) -> usize {
        self.trail.len()
    }

    /// Output of whichever of `predecessors` executed most recently
    pub fn latest_output(&self, predecessors: &[String]) -> Option<Value> {
        predecessors
            .iter()
            .filter_map(|p| {
                let at = self.trail.iter().rposition(|id| id == p)?;
                Some((at, p))
            })
            .max_by_key(|(at, _)| *at)
            .and_then(|(_, p)| self.steps.get(p))
            .map(|result| Value::Object(result.output.clone()))
    }

    /// Merge a variable write using its reducer
    pub fn apply_variable(&mut self, update: VariableUpdate) {
        let VariableUpdate {
            name,
            value,
            reducer,
        } = update;

        match reducer {
            ReducerType::Overwrite => {
                self.variables.insert(name, value);
            }
            ReducerType::Append => {
                let slot = self
                    .variables
                    .entry(name)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    let previous = slot.take();
                    *slot = Value::Array(if previous.is_null() {
                        Vec::new()
                    } else {
                        vec![previous]
                    });
                }
                if let Value::Array(items) = slot {
                    match value {
                        Value::Array(more) => items.extend(more),
                        other => items.push(other),
                    }
                }
            }
            ReducerType::Max | ReducerType::Min => {
                let Some(new) = as_f64(&value) else {
                    log::warn!(
                        "Run {}: ignoring non-numeric value for {:?} variable '{}'",
                        self.run_id,
                        reducer,
                        name
                    );
                    return;
                };
                let replace = match self.variables.get(&name).and_then(as_f64) {
                    None => true,
                    Some(current) if reducer == ReducerType::Max => new > current,
                    Some(current) => new < current,
                };
                if replace {
                    self.variables.insert(name, value);
                }
            }
            ReducerType::Merge => {
                let slot = self
                    .variables
                    .entry(name)
                    .or_insert_with(|| Value::Object(Map::new()));
                match (slot, value) {
                    (Value::Object(current), Value::Object(incoming)) => {
                        current.extend(incoming);
                    }
                    (slot, other) => *slot = other,
                }
            }
        }
    }
}
