// SPDX-License-Identifier: MIT

//! Durable execution substrate seam
//!
//! The engine starts runs and delivers resume signals only through
//! `Substrate`. A durable implementation persists and replays; the
//! in-process `LocalSubstrate` calls the orchestrator directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::loader::FlowStore;
use super::orchestrator::Orchestrator;
use crate::ndk::error::EngineError;

const SIGNAL_PREFIX: &str = "resume";

/// Address of a run inside the substrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    pub flow_id: String,
}

#[async_trait]
pub trait Substrate: Send + Sync {
    async fn start_run(&self, flow_id: &str, input: Value) -> Result<RunHandle, EngineError>;

    /// Deliver a named signal to a run. Delivery is at-least-once; the
    /// receiving run must tolerate duplicates.
    async fn signal_run(
        &self,
        handle: &RunHandle,
        signal: &str,
        payload: Map<String, Value>,
    ) -> Result<(), EngineError>;
}

/// Signal addressed to the node `node_id` of run `run_id`
pub fn signal_name(run_id: &str, node_id: &str) -> String {
    format!("{}:{}:{}", SIGNAL_PREFIX, run_id, node_id)
}

/// Split a signal name into `(run_id, node_id)`
pub fn parse_signal_name(signal: &str) -> Result<(&str, &str), EngineError> {
    let mut parts = signal.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(SIGNAL_PREFIX), Some(run_id), Some(node_id))
            if !run_id.is_empty() && !node_id.is_empty() =>
        {
            Ok((run_id, node_id))
        }
        _ => Err(EngineError::Signal(format!(
            "malformed signal name '{}'",
            signal
        ))),
    }
}

/// In-process substrate. Runs execute on the caller's task.
pub struct LocalSubstrate {
    flows: Arc<dyn FlowStore>,
    orchestrator: Arc<Orchestrator>,
}

impl LocalSubstrate {
    pub fn new(flows: Arc<dyn FlowStore>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            flows,
            orchestrator,
        }
    }
}

#[async_trait]
impl Substrate for LocalSubstrate {
    async fn start_run(&self, flow_id: &str, input: Value) -> Result<RunHandle, EngineError> {
        let flow = self
            .flows
            .get(flow_id)
            .await?
            .ok_or_else(|| EngineError::FlowNotFound(flow_id.to_string()))?;
        let state = self.orchestrator.start(flow, input).await?;
        Ok(RunHandle {
            run_id: state.run_id,
            flow_id: state.flow_id,
        })
    }

    async fn signal_run(
        &self,
        handle: &RunHandle,
        signal: &str,
        payload: Map<String, Value>,
    ) -> Result<(), EngineError> {
        let (run_id, node_id) = parse_signal_name(signal)?;
        if run_id != handle.run_id {
            return Err(EngineError::Signal(format!(
                "signal '{}' is not addressed to run {}",
                signal, handle.run_id
            )));
        }

        match self.orchestrator.resume(run_id, node_id, payload).await {
            Ok(_) => Ok(()),
            Err(EngineError::ExpiredWait { wait_id }) => {
                log::warn!("Dropping late signal {} for run {}", wait_id, run_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
