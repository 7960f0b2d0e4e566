// SPDX-License-Identifier: MIT

//! Engine facade
//!
//! Wires the flow store, run store, wait index, orchestrator and substrate
//! together and exposes the operations the HTTP surface and CLI call.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::correlation::{InboundEvent, WaitDescriptor, WaitIndex};
use super::loader::{FlowStore, InMemoryFlowStore};
use super::orchestrator::Orchestrator;
use super::registry::ExecutorRegistry;
use super::state::{InMemoryRunStore, RunState, RunStore};
use super::substrate::{signal_name, LocalSubstrate, RunHandle, Substrate};
use super::types::FlowDefinition;
use crate::kinetic::config::EngineConfig;
use crate::ndk::error::EngineError;

pub struct Engine {
    flows: Arc<dyn FlowStore>,
    runs: Arc<dyn RunStore>,
    waits: Arc<WaitIndex>,
    orchestrator: Arc<Orchestrator>,
    substrate: Arc<dyn Substrate>,
}

impl Engine {
    /// Engine backed by in-memory stores and the local substrate
    pub fn new(registry: ExecutorRegistry, config: &EngineConfig) -> Self {
        Self::with_stores(
            registry,
            config,
            Arc::new(InMemoryFlowStore::new()),
            Arc::new(InMemoryRunStore::new()),
        )
    }

    pub fn with_stores(
        registry: ExecutorRegistry,
        config: &EngineConfig,
        flows: Arc<dyn FlowStore>,
        runs: Arc<dyn RunStore>,
    ) -> Self {
        let waits = Arc::new(WaitIndex::new());
        let orchestrator = Arc::new(
            Orchestrator::new(registry, runs.clone(), waits.clone())
                .with_max_node_executions(config.max_node_executions),
        );
        let substrate = Arc::new(LocalSubstrate::new(flows.clone(), orchestrator.clone()));
        Self {
            flows,
            runs,
            waits,
            orchestrator,
            substrate,
        }
    }

    pub fn flows(&self) -> &Arc<dyn FlowStore> {
        &self.flows
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        self.orchestrator.registry()
    }

    /// Topological order of `flow`, or the validation error that would stop
    /// a run of it
    pub fn validate(&self, flow: FlowDefinition) -> Result<Vec<String>, EngineError> {
        let plan = self.orchestrator.compile(Arc::new(flow))?;
        Ok(plan.order)
    }

    /// Store a flow so runs can be started from it by id
    pub async fn register_flow(&self, flow: FlowDefinition) -> Result<(), EngineError> {
        log::info!("Registered flow {}", flow.id);
        self.flows.put(flow).await
    }

    /// Start a run of a stored flow and drive it until it pauses or ends
    pub async fn start_run(&self, flow_id: &str, input: Value) -> Result<RunState, EngineError> {
        let handle = self.substrate.start_run(flow_id, input).await?;
        self.get_run(&handle.run_id).await
    }

    /// Resume the run waiting on `wait_id` with `payload` as the paused
    /// node's output.
    ///
    /// A second resume of the same wait fails with `AlreadyResumed`; a wait
    /// of a terminated run fails with `ExpiredWait`.
    pub async fn resume(
        &self,
        wait_id: &str,
        payload: Map<String, Value>,
    ) -> Result<RunState, EngineError> {
        let wait = self.waits.claim(wait_id).await?;
        log::info!("Wait {} resumed for run {}", wait.id, wait.run_id);
        self.signal(&wait, payload).await?;
        self.get_run(&wait.run_id).await
    }

    /// Resume every run whose wait matches `event`; returns how many matched
    pub async fn dispatch(&self, event: &InboundEvent) -> Result<usize, EngineError> {
        let claimed = self.waits.claim_matching(event).await;
        log::info!("Event {} matched {} wait(s)", event.name, claimed.len());

        let deliveries = claimed
            .iter()
            .map(|wait| self.signal(wait, event.data.clone()));
        for (wait, outcome) in claimed.iter().zip(join_all(deliveries).await) {
            if let Err(e) = outcome {
                log::error!(
                    "Failed to resume run {} from wait {}: {}",
                    wait.run_id,
                    wait.id,
                    e
                );
            }
        }
        Ok(claimed.len())
    }

    pub async fn terminate(&self, run_id: &str) -> Result<RunState, EngineError> {
        self.orchestrator.terminate(run_id).await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunState, EngineError> {
        self.orchestrator.state(run_id).await
    }

    pub async fn list_runs(&self) -> Result<Vec<RunState>, EngineError> {
        self.runs.list().await
    }

    pub async fn get_wait(&self, wait_id: &str) -> Result<WaitDescriptor, EngineError> {
        self.waits
            .get(wait_id)
            .await
            .ok_or_else(|| EngineError::WaitNotFound(wait_id.to_string()))
    }

    pub async fn active_waits(&self) -> Vec<WaitDescriptor> {
        self.waits.list_active().await
    }

    /// Expire waits created before `cutoff` and terminate their runs.
    ///
    /// The engine never times waits out by itself; a scheduler calls this.
    pub async fn expire_waits_before(&self, cutoff: DateTime<Utc>) -> Result<usize, EngineError> {
        let expired = self.waits.expire_before(cutoff).await;
        for wait in &expired {
            match self.orchestrator.terminate(&wait.run_id).await {
                Ok(_) | Err(EngineError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(expired.len())
    }

    /// Signal the run behind a claimed wait. An undelivered signal puts the
    /// wait back to ACTIVE so it can be resumed again.
    async fn signal(
        &self,
        wait: &WaitDescriptor,
        payload: Map<String, Value>,
    ) -> Result<(), EngineError> {
        let outcome = self.deliver(wait, payload).await;
        if outcome.is_err() && self.waits.release(&wait.id).await {
            log::warn!("Wait {} reopened after a failed resume", wait.id);
        }
        outcome
    }

    async fn deliver(
        &self,
        wait: &WaitDescriptor,
        payload: Map<String, Value>,
    ) -> Result<(), EngineError> {
        let run = self.get_run(&wait.run_id).await?;
        let handle = RunHandle {
            run_id: run.run_id,
            flow_id: run.flow_id,
        };
        let signal = signal_name(&wait.run_id, &wait.node_id);
        self.substrate.signal_run(&handle, &signal, payload).await
    }
}
