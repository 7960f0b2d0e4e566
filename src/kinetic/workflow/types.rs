// SPDX-License-Identifier: MIT

//! Flow definition types
//!
//! These are the structures parsed from flow YAML/JSON files. A flow is
//! immutable once a run has been started from it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A directed graph of typed nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FlowDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Nodes in declaration order; this order breaks scheduling ties
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

/// A typed step in a flow
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeDefinition {
    /// Unique within the flow
    pub id: String,
    /// Selects the executor (case-insensitive)
    #[serde(rename = "type")]
    pub node_type: String,
    /// Values may contain `{{ path }}` templates
    #[serde(default)]
    pub config: Map<String, Value>,
}

/// Connection between two nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EdgeDefinition {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    /// Branch taken when the source is a conditional node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<BranchLabel>,
}

/// `true`/`false` label on a conditional branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchLabel {
    True,
    False,
}

impl BranchLabel {
    pub fn matches(&self, result: bool) -> bool {
        matches!((self, result), (BranchLabel::True, true) | (BranchLabel::False, false))
    }
}

impl From<bool> for BranchLabel {
    fn from(b: bool) -> Self {
        if b {
            BranchLabel::True
        } else {
            BranchLabel::False
        }
    }
}

/// Label as written in a flow file (bool or string)
#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Bool(bool),
    Text(String),
}

impl<'de> Deserialize<'de> for BranchLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawLabel::deserialize(deserializer)? {
            RawLabel::Bool(b) => Ok(b.into()),
            RawLabel::Text(s) => crate::ndk::value::parse_bool(&s)
                .map(BranchLabel::from)
                .ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "branch label must be true or false, got '{}'",
                        s
                    ))
                }),
        }
    }
}

impl Serialize for BranchLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(matches!(self, BranchLabel::True))
    }
}

impl FlowDefinition {
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Fill in default edge ids (`source->target`)
    pub fn with_edge_ids(mut self) -> Self {
        for edge in &mut self.edges {
            if edge.id.is_empty() {
                edge.id = format!("{}->{}", edge.source, edge.target);
            }
        }
        self
    }
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config: Map::new(),
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = crate::ndk::value::into_output(config);
        self
    }
}

impl EdgeDefinition {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            label: None,
        }
    }

    pub fn labelled(mut self, label: bool) -> Self {
        self.label = Some(label.into());
        self
    }
}
