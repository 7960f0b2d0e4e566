// SPDX-License-Identifier: MIT

//! Run orchestrator
//!
//! Drives one run node by node over its `ExecutionPlan`. The cursor walks
//! the topological order; a node runs only once an executed predecessor (or
//! a goto) has activated it. A PAUSED result parks the run behind a
//! `WaitDescriptor` and returns; `resume` rebuilds the run from its record
//! and continues with the same successor rules.
//!
//! Start, resume and terminate of one run are serialized by a per-run lock,
//! held from the first load until the last save. A signal that lands while
//! the run is still pausing waits for the PAUSED record instead of racing it.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::condition::is_truthy;
use super::correlation::{WaitDescriptor, WaitIndex};
use super::graph::{CompiledNode, ExecutionPlan};
use super::registry::ExecutorRegistry;
use super::state::{RunFailure, RunRecord, RunState, RunStatus, RunStore};
use super::substrate::signal_name;
use super::types::FlowDefinition;
use crate::ndk::error::EngineError;
use crate::ndk::executor::RunContext;
use crate::ndk::expression::{resolve_map, Scope};
use crate::ndk::result::{NodeResult, NodeStatus, WaitCondition};
use crate::ndk::value::as_bool;

pub const DEFAULT_MAX_NODE_EXECUTIONS: usize = 1000;

/// What the drive loop does after a node settles
enum Step {
    Continue,
    Stop,
}

pub struct Orchestrator {
    registry: ExecutorRegistry,
    runs: Arc<dyn RunStore>,
    waits: Arc<WaitIndex>,
    max_node_executions: usize,
    /// One lock per run with a start, resume or terminate in flight
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Running runs asked to stop before their next node
    cancelled: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        registry: ExecutorRegistry,
        runs: Arc<dyn RunStore>,
        waits: Arc<WaitIndex>,
    ) -> Self {
        Self {
            registry,
            runs,
            waits,
            max_node_executions: DEFAULT_MAX_NODE_EXECUTIONS,
            locks: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_max_node_executions(mut self, max: usize) -> Self {
        self.max_node_executions = max.max(1);
        self
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Validate `flow` against the registry without running it
    pub fn compile(&self, flow: Arc<FlowDefinition>) -> Result<ExecutionPlan, EngineError> {
        ExecutionPlan::compile(flow, &self.registry)
    }

    /// Start a run and drive it until it pauses or finishes.
    ///
    /// Graph and node-type errors are returned before any node executes.
    pub async fn start(
        &self,
        flow: Arc<FlowDefinition>,
        input: Value,
    ) -> Result<RunState, EngineError> {
        let plan = self.compile(flow)?;
        let run_id = Uuid::new_v4().to_string();

        let mut state = RunState::new(&run_id, &plan.flow.id, input);
        state.activated = plan.entry_nodes().into_iter().collect();
        log::info!(
            "Run {}: started flow {} ({} nodes)",
            run_id,
            plan.flow.id,
            plan.len()
        );

        let lock = self.run_lock(&run_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            match self.persist(&plan, &state).await {
                Ok(()) => self.drive(&plan, state).await,
                Err(e) => Err(e),
            }
        };
        self.release(&run_id, lock).await;
        outcome
    }

    /// Continue a run paused at `node_id` with `payload` as that node's output.
    ///
    /// A signal that arrives while the run is being driven waits for that
    /// drive to settle. Signals for a run that is not paused at `node_id`
    /// (duplicate delivery) are dropped and the current state is returned.
    /// Signals for a terminated run fail with `ExpiredWait`.
    pub async fn resume(
        &self,
        run_id: &str,
        node_id: &str,
        payload: Map<String, Value>,
    ) -> Result<RunState, EngineError> {
        let lock = self.run_lock(run_id).await;
        let outcome = {
            let _guard = lock.lock().await;
            self.resume_paused(run_id, node_id, payload).await
        };
        self.release(run_id, lock).await;
        outcome
    }

    async fn resume_paused(
        &self,
        run_id: &str,
        node_id: &str,
        payload: Map<String, Value>,
    ) -> Result<RunState, EngineError> {
        let RunRecord { flow, mut state } = self.record(run_id).await?;

        let status = state.status;
        match status {
            RunStatus::Terminated => {
                return Err(EngineError::ExpiredWait {
                    wait_id: signal_name(run_id, node_id),
                })
            }
            RunStatus::Paused if state.paused_at.as_deref() == Some(node_id) => {}
            status => {
                log::warn!(
                    "Run {}: ignoring duplicate signal for {} (run is {}, paused at {:?})",
                    run_id,
                    node_id,
                    status,
                    state.paused_at
                );
                return Ok(state);
            }
        }

        let plan = self.compile(flow)?;
        let mut output = state
            .steps
            .get(node_id)
            .map(|r| r.output.clone())
            .unwrap_or_default();
        output.extend(payload);

        state.transition(RunStatus::Running)?;
        state.paused_at = None;
        state.wait_id = None;
        log::info!("Run {}: resumed at {}", run_id, node_id);

        let step = match plan.node(node_id) {
            Some(node) => {
                let result = NodeResult::success(output);
                self.settle(&plan, &mut state, node, result).await?
            }
            None => {
                let result = NodeResult::failed("paused node no longer in flow");
                self.fail(&mut state, node_id, result)?
            }
        };
        self.persist(&plan, &state).await?;

        match step {
            Step::Continue => self.drive(&plan, state).await,
            Step::Stop => Ok(state),
        }
    }

    /// Terminate a RUNNING or PAUSED run and expire its waits.
    ///
    /// A run being driven right now is flagged so it stops before its next
    /// node, and the call waits for that drive to settle. A drive that
    /// pauses instead is terminated from its PAUSED record.
    pub async fn terminate(&self, run_id: &str) -> Result<RunState, EngineError> {
        let lock = self.run_lock(run_id).await;
        let outcome = {
            let (_guard, requested) = match lock.try_lock() {
                Ok(guard) => (guard, false),
                Err(_) => {
                    log::info!("Run {}: termination requested", run_id);
                    self.cancelled.lock().await.insert(run_id.to_string());
                    (lock.lock().await, true)
                }
            };
            self.cancelled.lock().await.remove(run_id);
            self.terminate_locked(run_id, requested).await
        };
        self.release(run_id, lock).await;
        outcome
    }

    async fn terminate_locked(
        &self,
        run_id: &str,
        requested: bool,
    ) -> Result<RunState, EngineError> {
        let RunRecord { flow, mut state } = self.record(run_id).await?;
        if requested && state.status == RunStatus::Terminated {
            // the drive we waited on already stopped
            return Ok(state);
        }

        state.transition(RunStatus::Terminated)?;
        state.paused_at = None;
        state.wait_id = None;
        let expired = self.waits.expire_run(run_id).await;
        log::info!("Run {}: terminated, {} wait(s) expired", run_id, expired);
        self.runs.save(RunRecord { flow, state: state.clone() }).await?;
        Ok(state)
    }

    pub async fn state(&self, run_id: &str) -> Result<RunState, EngineError> {
        Ok(self.record(run_id).await?.state)
    }

    async fn record(&self, run_id: &str) -> Result<RunRecord, EngineError> {
        self.runs
            .load(run_id)
            .await?
            .ok_or_else(|| EngineError::RunNotFound(run_id.to_string()))
    }

    async fn persist(&self, plan: &ExecutionPlan, state: &RunState) -> Result<(), EngineError> {
        self.runs
            .save(RunRecord {
                flow: plan.flow.clone(),
                state: state.clone(),
            })
            .await
    }

    async fn run_lock(&self, run_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(run_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop a run's lock once no other task holds or waits on it
    async fn release(&self, run_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if matches!(locks.get(run_id), Some(l) if Arc::strong_count(l) == 1) {
            locks.remove(run_id);
        }
    }

    async fn drive(
        &self,
        plan: &ExecutionPlan,
        mut state: RunState,
    ) -> Result<RunState, EngineError> {
        loop {
            if self.cancelled.lock().await.remove(&state.run_id) {
                state.transition(RunStatus::Terminated)?;
                let expired = self.waits.expire_run(&state.run_id).await;
                log::info!(
                    "Run {}: terminated, {} wait(s) expired",
                    state.run_id,
                    expired
                );
                break;
            }

            let Some(node_id) = next_node(plan, &mut state) else {
                state.transition(RunStatus::Completed)?;
                break;
            };
            let Some(node) = plan.node(&node_id) else {
                let result = NodeResult::failed("node missing from plan");
                self.fail(&mut state, &node_id, result)?;
                self.persist(plan, &state).await?;
                return Ok(state);
            };

            let step = if state.executions() >= self.max_node_executions {
                let message = format!("exceeded {} node executions", self.max_node_executions);
                self.fail(&mut state, &node_id, NodeResult::failed(message))?
            } else {
                let result = self.execute_node(node, &state).await;
                self.settle(plan, &mut state, node, result).await?
            };
            self.persist(plan, &state).await?;

            if let Step::Stop = step {
                return Ok(state);
            }
        }

        self.persist(plan, &state).await?;
        Ok(state)
    }

    /// Resolve config and run the executor. Every failure becomes a FAILED
    /// result; nothing here aborts the engine.
    async fn execute_node(&self, node: &CompiledNode, state: &RunState) -> NodeResult {
        let node_id = node.id();
        let input = state
            .latest_output(&node.predecessors)
            .unwrap_or_else(|| state.input.clone());

        let scope = Scope {
            steps: &state.steps,
            input: &input,
            config: &node.definition.config,
            variables: &state.variables,
        };
        let config = match resolve_map(&node.definition.config, &scope) {
            Ok(config) => config,
            Err(e) => return NodeResult::failed(e.to_string()),
        };

        let ctx = RunContext {
            run_id: &state.run_id,
            flow_id: &state.flow_id,
            node_id,
            config,
            input,
            steps: &state.steps,
            variables: &state.variables,
        };

        log::debug!(
            "Run {}: executing {} ({})",
            state.run_id,
            node_id,
            node.definition.node_type
        );
        match node.executor.execute(&ctx).await {
            Ok(result) => result,
            Err(e) => NodeResult::failed(e.to_string()),
        }
    }

    /// Apply a node result to run state and pick what runs next
    async fn settle(
        &self,
        plan: &ExecutionPlan,
        state: &mut RunState,
        node: &CompiledNode,
        mut result: NodeResult,
    ) -> Result<Step, EngineError> {
        let node_id = node.id();
        match result.status {
            NodeStatus::Failed => self.fail(state, node_id, result),
            NodeStatus::Paused => {
                let Some(condition) = result.wait.take() else {
                    let result = NodeResult::failed("paused without a wait condition");
                    return self.fail(state, node_id, result);
                };
                let wait_id = match &condition {
                    WaitCondition::Direct { action_id } => action_id.clone(),
                    WaitCondition::Event { .. } => {
                        format!("{}:{}:{}", state.run_id, node_id, state.executions())
                    }
                };

                let wait = WaitDescriptor::new(&wait_id, &state.run_id, node_id, condition);
                if let Err(e) = self.waits.insert(wait).await {
                    return self.fail(state, node_id, NodeResult::failed(e.to_string()));
                }

                state.record(node_id, result);
                state.paused_at = Some(node_id.to_string());
                state.wait_id = Some(wait_id.clone());
                state.transition(RunStatus::Paused)?;
                log::info!(
                    "Run {}: paused at {} waiting on {}",
                    state.run_id,
                    node_id,
                    wait_id
                );
                Ok(Step::Stop)
            }
            NodeStatus::Success => {
                let goto = result.take_goto();
                for update in std::mem::take(&mut result.variables) {
                    state.apply_variable(update);
                }
                let branch = node.is_branching().then(|| {
                    result
                        .output
                        .get("result")
                        .map(branch_value)
                        .unwrap_or(false)
                });
                state.record(node_id, result);

                if let Some(target) = goto {
                    let Some(position) = plan.position(&target) else {
                        let message = format!("goto target '{}' does not exist", target);
                        return self.fail(state, node_id, NodeResult::failed(message));
                    };
                    log::debug!("Run {}: {} jumps to {}", state.run_id, node_id, target);
                    state.activated.insert(target);
                    state.cursor = position;
                    return Ok(Step::Continue);
                }

                for edge in &node.outgoing {
                    let follow = match (branch, edge.label) {
                        (Some(value), Some(label)) => label.matches(value),
                        _ => true,
                    };
                    if follow {
                        state.activated.insert(edge.target.clone());
                    }
                }
                Ok(Step::Continue)
            }
        }
    }

    fn fail(
        &self,
        state: &mut RunState,
        node_id: &str,
        mut result: NodeResult,
    ) -> Result<Step, EngineError> {
        let message = result
            .error
            .get_or_insert_with(|| "node failed".to_string())
            .clone();
        log::error!("Run {}: node {} failed: {}", state.run_id, node_id, message);

        result.status = NodeStatus::Failed;
        state.record(node_id, result);
        state.failure = Some(RunFailure {
            node_id: node_id.to_string(),
            message,
        });
        state.transition(RunStatus::Failed)?;
        Ok(Step::Stop)
    }
}

/// Advance the cursor to the next activated node
fn next_node(plan: &ExecutionPlan, state: &mut RunState) -> Option<String> {
    while let Some(id) = plan.order.get(state.cursor) {
        state.cursor += 1;
        if state.activated.remove(id) {
            return Some(id.clone());
        }
    }
    None
}

fn branch_value(value: &Value) -> bool {
    as_bool(value).unwrap_or_else(|| is_truthy(value))
}
