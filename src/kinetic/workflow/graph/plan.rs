// SPDX-License-Identifier: MIT

//! Validated, ordered view of a flow ready for execution

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::scheduler::{order_with_edges, valid_edges};
use crate::kinetic::workflow::registry::ExecutorRegistry;
use crate::kinetic::workflow::types::{EdgeDefinition, FlowDefinition, NodeDefinition};
use crate::ndk::error::{EngineError, GraphError};
use crate::ndk::executor::{NodeExecutor, NodeKind};

/// Compiled node ready for execution
pub struct CompiledNode {
    pub definition: NodeDefinition,
    pub executor: Arc<dyn NodeExecutor>,
    pub kind: NodeKind,
    /// Valid outgoing edges in declaration order
    pub outgoing: Vec<EdgeDefinition>,
    /// Sources of valid incoming edges
    pub predecessors: Vec<String>,
}

impl CompiledNode {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    /// A conditional whose branches are selected by label
    pub fn is_branching(&self) -> bool {
        self.kind == NodeKind::Conditional && self.outgoing.iter().any(|e| e.label.is_some())
    }
}

/// A flow that passed static validation
pub struct ExecutionPlan {
    pub flow: Arc<FlowDefinition>,
    /// Topological order; the default successor sequence
    pub order: Vec<String>,
    nodes: HashMap<String, CompiledNode>,
    position: HashMap<String, usize>,
}

impl ExecutionPlan {
    /// Validate `flow` and bind every node to its executor.
    ///
    /// Fails with `GraphError` for cycles, duplicate ids and malformed
    /// branches, or `UnknownNodeType` for unregistered types.
    pub fn compile(
        flow: Arc<FlowDefinition>,
        registry: &ExecutorRegistry,
    ) -> Result<Self, EngineError> {
        let edges = valid_edges(&flow);
        let order: Vec<String> = order_with_edges(&flow, &edges)?
            .into_iter()
            .map(|n| n.id.clone())
            .collect();

        let mut nodes = HashMap::with_capacity(flow.nodes.len());
        for node in &flow.nodes {
            let executor = registry.resolve(&node.id, &node.node_type)?;
            let kind = executor.kind();
            let outgoing: Vec<EdgeDefinition> = edges
                .iter()
                .filter(|e| e.source == node.id)
                .map(|e| (*e).clone())
                .collect();
            let predecessors = edges
                .iter()
                .filter(|e| e.target == node.id)
                .map(|e| e.source.clone())
                .collect();

            validate_branches(node, kind, &outgoing)?;

            nodes.insert(
                node.id.clone(),
                CompiledNode {
                    definition: node.clone(),
                    executor,
                    kind,
                    outgoing,
                    predecessors,
                },
            );
        }

        let position = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        log::debug!("Compiled flow {} with order {:?}", flow.id, order);

        Ok(Self {
            flow,
            order,
            nodes,
            position,
        })
    }

    pub fn node(&self, id: &str) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.position.get(id).copied()
    }

    /// Nodes with no valid incoming edge
    pub fn entry_nodes(&self) -> HashSet<String> {
        self.order
            .iter()
            .filter(|id| self.nodes[*id].predecessors.is_empty())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn validate_branches(
    node: &NodeDefinition,
    kind: NodeKind,
    outgoing: &[EdgeDefinition],
) -> Result<(), GraphError> {
    match kind {
        NodeKind::Standard => {
            if let Some(edge) = outgoing.iter().find(|e| e.label.is_some()) {
                return Err(GraphError::UnexpectedLabel {
                    edge_id: edge.id.clone(),
                    node_id: node.id.clone(),
                });
            }
        }
        NodeKind::Conditional => {
            let labelled = outgoing.iter().filter(|e| e.label.is_some()).count();
            let ambiguous = labelled > 0 && labelled < outgoing.len();
            if ambiguous || (outgoing.len() > 1 && labelled == 0) {
                return Err(GraphError::UnlabelledBranch {
                    node_id: node.id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndk::executor::RunContext;
    use crate::ndk::result::NodeResult;
    use async_trait::async_trait;
    use serde_json::Map;

    struct StubExecutor {
        node_type: &'static str,
        kind: NodeKind,
    }

    #[async_trait]
    impl NodeExecutor for StubExecutor {
        fn node_type(&self) -> &str {
            self.node_type
        }

        fn kind(&self) -> NodeKind {
            self.kind
        }

        async fn execute(&self, _ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
            Ok(NodeResult::success(Map::new()))
        }
    }

    fn registry() -> ExecutorRegistry {
        ExecutorRegistry::new()
            .with(Arc::new(StubExecutor {
                node_type: "step",
                kind: NodeKind::Standard,
            }))
            .with(Arc::new(StubExecutor {
                node_type: "condition",
                kind: NodeKind::Conditional,
            }))
    }

    fn flow(nodes: Vec<NodeDefinition>, edges: Vec<EdgeDefinition>) -> Arc<FlowDefinition> {
        Arc::new(FlowDefinition {
            id: "plan-test".to_string(),
            name: String::new(),
            description: String::new(),
            nodes,
            edges,
        })
    }

    #[test]
    fn test_compile_branching_flow() {
        let f = flow(
            vec![
                NodeDefinition::new("start", "step"),
                NodeDefinition::new("check", "CONDITION"),
                NodeDefinition::new("yes", "step"),
                NodeDefinition::new("no", "step"),
            ],
            vec![
                EdgeDefinition::new("start", "check"),
                EdgeDefinition::new("check", "yes").labelled(true),
                EdgeDefinition::new("check", "no").labelled(false),
            ],
        );
        let plan = ExecutionPlan::compile(f, &registry()).unwrap();

        assert_eq!(plan.order, vec!["start", "check", "yes", "no"]);
        assert!(plan.node("check").unwrap().is_branching());
        assert!(!plan.node("start").unwrap().is_branching());
        assert_eq!(plan.node("yes").unwrap().predecessors, vec!["check"]);
        assert_eq!(plan.entry_nodes(), HashSet::from(["start".to_string()]));
        assert_eq!(plan.position("no"), Some(3));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let f = flow(vec![NodeDefinition::new("a", "warp")], vec![]);
        assert!(matches!(
            ExecutionPlan::compile(f, &registry()),
            Err(EngineError::UnknownNodeType { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let f = flow(
            vec![NodeDefinition::new("a", "step"), NodeDefinition::new("b", "step")],
            vec![EdgeDefinition::new("a", "b"), EdgeDefinition::new("b", "a")],
        );
        assert!(matches!(
            ExecutionPlan::compile(f, &registry()),
            Err(EngineError::Graph(GraphError::Cycle { .. }))
        ));
    }

    #[test]
    fn test_unlabelled_conditional_branches_rejected() {
        let f = flow(
            vec![
                NodeDefinition::new("check", "condition"),
                NodeDefinition::new("a", "step"),
                NodeDefinition::new("b", "step"),
            ],
            vec![EdgeDefinition::new("check", "a"), EdgeDefinition::new("check", "b")],
        );
        assert!(matches!(
            ExecutionPlan::compile(f, &registry()),
            Err(EngineError::Graph(GraphError::UnlabelledBranch { .. }))
        ));
    }

    #[test]
    fn test_partially_labelled_conditional_rejected() {
        let f = flow(
            vec![
                NodeDefinition::new("check", "condition"),
                NodeDefinition::new("a", "step"),
                NodeDefinition::new("b", "step"),
            ],
            vec![
                EdgeDefinition::new("check", "a").labelled(true),
                EdgeDefinition::new("check", "b"),
            ],
        );
        assert!(matches!(
            ExecutionPlan::compile(f, &registry()),
            Err(EngineError::Graph(GraphError::UnlabelledBranch { .. }))
        ));
    }

    #[test]
    fn test_single_unlabelled_conditional_edge_allowed() {
        let f = flow(
            vec![NodeDefinition::new("check", "condition"), NodeDefinition::new("a", "step")],
            vec![EdgeDefinition::new("check", "a")],
        );
        let plan = ExecutionPlan::compile(f, &registry()).unwrap();
        assert!(!plan.node("check").unwrap().is_branching());
    }

    #[test]
    fn test_label_on_standard_node_rejected() {
        let f = flow(
            vec![NodeDefinition::new("a", "step"), NodeDefinition::new("b", "step")],
            vec![EdgeDefinition::new("a", "b").labelled(true)],
        );
        assert!(matches!(
            ExecutionPlan::compile(f, &registry()),
            Err(EngineError::Graph(GraphError::UnexpectedLabel { .. }))
        ));
    }
}
