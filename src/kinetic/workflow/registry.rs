// SPDX-License-Identifier: MIT

use crate::ndk::error::EngineError;
use crate::ndk::executor::NodeExecutor;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps node types to their executors.
///
/// Built once at startup and shared with the orchestrator; type names are
/// matched case-insensitively.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

fn normalize(node_type: &str) -> String {
    node_type.trim().to_ascii_lowercase()
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the executor's own type name
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        let name = normalize(executor.node_type());
        self.executors.insert(name, executor);
    }

    /// Register under an additional type name
    pub fn register_alias(&mut self, alias: &str, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(normalize(alias), executor);
    }

    pub fn with(mut self, executor: Arc<dyn NodeExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&normalize(node_type)).cloned()
    }

    /// Executor for a node, or `UnknownNodeType`
    pub fn resolve(
        &self,
        node_id: &str,
        node_type: &str,
    ) -> Result<Arc<dyn NodeExecutor>, EngineError> {
        self.get(node_type).ok_or_else(|| EngineError::UnknownNodeType {
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
        })
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("types", &self.types())
            .finish()
    }
}
