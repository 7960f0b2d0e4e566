// SPDX-License-Identifier: MIT

//! Flow loader and flow storage
//!
//! Flows are authored as YAML or JSON files. The loader parses them; a
//! `FlowStore` serves them to the engine by id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::FlowDefinition;
use crate::ndk::error::EngineError;

/// Loads flow definitions from YAML/JSON files
pub struct FlowLoader;

impl FlowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a flow definition from a file; `.json` files are parsed as JSON,
    /// everything else as YAML
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FlowDefinition, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let flow = if is_json {
            Self::parse_json(&content)?
        } else {
            Self::parse_yaml(&content)?
        };
        log::debug!("Loaded flow {} from {}", flow.id, path.display());
        Ok(flow)
    }

    /// Load every `*.yaml`, `*.yml` and `*.json` file of a directory,
    /// sorted by file name
    pub fn load_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<FlowDefinition>, EngineError> {
        let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| matches!(ext, "yaml" | "yml" | "json"))
            })
            .collect();
        paths.sort();

        paths.iter().map(|path| self.load_file(path)).collect()
    }

    /// Parse a flow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<FlowDefinition, EngineError> {
        let flow: FlowDefinition = serde_yaml::from_str(content)?;
        Self::checked(flow)
    }

    /// Parse a flow definition from a JSON string
    pub fn parse_json(content: &str) -> Result<FlowDefinition, EngineError> {
        let flow: FlowDefinition = serde_json::from_str(content)?;
        Self::checked(flow)
    }

    fn checked(flow: FlowDefinition) -> Result<FlowDefinition, EngineError> {
        if flow.id.trim().is_empty() {
            return Err(EngineError::config("flow id must not be empty"));
        }
        Ok(flow.with_edge_ids())
    }
}

impl Default for FlowLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Source of flow definitions by id
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Arc<FlowDefinition>>, EngineError>;

    /// Insert or replace
    async fn put(&self, flow: FlowDefinition) -> Result<(), EngineError>;

    async fn list(&self) -> Result<Vec<Arc<FlowDefinition>>, EngineError>;
}

/// Process-local flow store
#[derive(Clone, Default)]
pub struct InMemoryFlowStore {
    flows: Arc<RwLock<HashMap<String, Arc<FlowDefinition>>>>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn get(&self, id: &str) -> Result<Option<Arc<FlowDefinition>>, EngineError> {
        let flows = self.flows.read().await;
        Ok(flows.get(id).cloned())
    }

    async fn put(&self, flow: FlowDefinition) -> Result<(), EngineError> {
        let mut flows = self.flows.write().await;
        flows.insert(flow.id.clone(), Arc::new(flow));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Arc<FlowDefinition>>, EngineError> {
        let flows = self.flows.read().await;
        let mut all: Vec<Arc<FlowDefinition>> = flows.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::workflow::types::BranchLabel;

    const APPROVAL_YAML: &str = r#"
id: invoice-approval
name: Invoice approval
nodes:
  - { id: trigger, type: trigger }
  - { id: check, type: condition, config: { result: "{{ input.amount_ok }}" } }
  - { id: approve, type: human_task, config: { title: "Approve invoice" } }
  - { id: reject, type: debug }
edges:
  - { source: trigger, target: check }
  - { source: check, target: approve, label: true }
  - { source: check, target: reject, label: "false" }
"#;

    #[test]
    fn test_parse_yaml_flow() {
        let flow = FlowLoader::parse_yaml(APPROVAL_YAML).unwrap();
        assert_eq!(flow.id, "invoice-approval");
        assert_eq!(flow.nodes.len(), 4);
        assert_eq!(flow.edges[1].id, "check->approve");
        assert_eq!(flow.edges[2].label, Some(BranchLabel::False));
    }

    #[test]
    fn test_parse_json_flow() {
        let json = r#"{
            "id": "j",
            "nodes": [{"id": "a", "type": "debug", "config": {"message": "hi"}}],
            "edges": []
        }"#;
        let flow = FlowLoader::parse_json(json).unwrap();
        assert_eq!(flow.nodes[0].config["message"], "hi");
    }

    #[test]
    fn test_missing_id_rejected() {
        assert!(FlowLoader::parse_yaml("id: ''\nnodes: []").is_err());
        assert!(FlowLoader::parse_yaml("nodes: []").is_err());
    }

    #[test]
    fn test_load_dir() {
        let dir = std::env::temp_dir()
            .join(format!("kinetic-flow-loader-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.yaml"), APPROVAL_YAML).unwrap();
        fs::write(dir.join("a.json"), r#"{"id": "first", "nodes": []}"#).unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let flows = FlowLoader::new().load_dir(&dir).unwrap();
        let ids: Vec<&str> = flows.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "invoice-approval"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_flow_store() {
        let store = InMemoryFlowStore::new();
        store.put(FlowLoader::parse_yaml(APPROVAL_YAML).unwrap()).await.unwrap();

        let flow = store.get("invoice-approval").await.unwrap().unwrap();
        assert_eq!(flow.nodes[1].node_type, "condition");
        assert!(store.get("missing").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
