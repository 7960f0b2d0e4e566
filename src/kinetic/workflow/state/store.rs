// SPDX-License-Identifier: MIT

//! Run persistence seam

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::run::RunState;
use crate::kinetic::workflow::types::FlowDefinition;
use crate::ndk::error::EngineError;

/// A run together with the flow snapshot it was started from
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub flow: Arc<FlowDefinition>,
    pub state: RunState,
}

/// Storage for run records.
///
/// A paused run holds no engine resources; it is rebuilt from its record
/// when a signal arrives.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace
    async fn save(&self, record: RunRecord) -> Result<(), EngineError>;

    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, EngineError>;

    async fn list(&self) -> Result<Vec<RunState>, EngineError>;
}

/// Process-local run store
#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<RwLock<HashMap<String, RunRecord>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, record: RunRecord) -> Result<(), EngineError> {
        let mut runs = self.runs.write().await;
        runs.insert(record.state.run_id.clone(), record);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunRecord>, EngineError> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).cloned())
    }

    async fn list(&self) -> Result<Vec<RunState>, EngineError> {
        let runs = self.runs.read().await;
        let mut states: Vec<RunState> = runs.values().map(|r| r.state.clone()).collect();
        states.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.run_id.cmp(&b.run_id))
        });
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::workflow::state::RunStatus;
    use serde_json::json;

    fn record(run_id: &str) -> RunRecord {
        RunRecord {
            flow: Arc::new(FlowDefinition {
                id: "flow".to_string(),
                name: String::new(),
                description: String::new(),
                nodes: vec![],
                edges: vec![],
            }),
            state: RunState::new(run_id, "flow", json!({})),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryRunStore::new();
        store.save(record("r1")).await.unwrap();

        let loaded = store.load("r1").await.unwrap().unwrap();
        assert_eq!(loaded.state.run_id, "r1");
        assert_eq!(loaded.flow.id, "flow");
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let store = InMemoryRunStore::new();
        let mut rec = record("r1");
        store.save(rec.clone()).await.unwrap();

        rec.state.transition(RunStatus::Paused).unwrap();
        store.save(rec).await.unwrap();

        let runs = store.list().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Paused);
    }

    #[tokio::test]
    async fn test_store_is_clone() {
        let store = InMemoryRunStore::new();
        let clone = store.clone();
        store.save(record("shared")).await.unwrap();
        assert!(clone.load("shared").await.unwrap().is_some());
    }
}
