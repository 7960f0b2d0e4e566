// SPDX-License-Identifier: MIT

//! Topological ordering of a flow graph

use std::collections::{BTreeSet, HashMap};

use crate::kinetic::workflow::types::{EdgeDefinition, FlowDefinition, NodeDefinition};
use crate::ndk::error::GraphError;

/// Edges whose source and target both exist. Dangling edges are dropped
/// with a warning, never fatal.
pub fn valid_edges(flow: &FlowDefinition) -> Vec<&EdgeDefinition> {
    flow.edges
        .iter()
        .filter(|edge| {
            let ok = flow.node(&edge.source).is_some() && flow.node(&edge.target).is_some();
            if !ok {
                log::warn!(
                    "Flow {}: dropping dangling edge {} ({} -> {})",
                    flow.id,
                    edge.id,
                    edge.source,
                    edge.target
                );
            }
            ok
        })
        .collect()
}

/// Order the nodes of `flow` so every edge's source precedes its target
pub fn order(flow: &FlowDefinition) -> Result<Vec<&NodeDefinition>, GraphError> {
    let edges = valid_edges(flow);
    order_with_edges(flow, &edges)
}

/// Kahn's algorithm over `edges`.
///
/// Among nodes that become ready at the same time, the one declared first
/// in the flow runs first.
pub fn order_with_edges<'f>(
    flow: &'f FlowDefinition,
    edges: &[&EdgeDefinition],
) -> Result<Vec<&'f NodeDefinition>, GraphError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(flow.nodes.len());
    for (i, node) in flow.nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(GraphError::DuplicateNode(node.id.clone()));
        }
    }

    let mut in_degree = vec![0usize; flow.nodes.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); flow.nodes.len()];
    for edge in edges {
        if let (Some(&from), Some(&to)) = (
            index.get(edge.source.as_str()),
            index.get(edge.target.as_str()),
        ) {
            in_degree[to] += 1;
            successors[from].push(to);
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| i)
        .collect();

    let mut sorted = Vec::with_capacity(flow.nodes.len());
    while let Some(current) = ready.pop_first() {
        sorted.push(current);
        for &next in &successors[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if sorted.len() < flow.nodes.len() {
        let nodes = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree > 0)
            .map(|(i, _)| flow.nodes[i].id.clone())
            .collect();
        return Err(GraphError::Cycle { nodes });
    }

    Ok(sorted.into_iter().map(|i| &flow.nodes[i]).collect())
}
