//! Workflow document model
//!
//! The abstract workflow reconstructed from source: nodes, edges, entry
//! point and state schema. Positions are filled in by the layout engine and
//! the finished document is consumed read-only by canvas renderers.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Tool invocation node
    Tool,
    /// LLM step node
    Llm,
    /// Conditional branch node
    Conditional,
    /// Human approval node
    Approval,
    /// Unclassified node (best-effort inference fallback)
    Custom,
    /// Start node
    Start,
    /// End node
    End,
    /// Router node
    Router,
    /// Agent node
    Agent,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Tool => "tool",
            NodeType::Llm => "llm",
            NodeType::Conditional => "conditional",
            NodeType::Approval => "approval",
            NodeType::Custom => "custom",
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Router => "router",
            NodeType::Agent => "agent",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool" => Ok(NodeType::Tool),
            "llm" => Ok(NodeType::Llm),
            "conditional" => Ok(NodeType::Conditional),
            "approval" => Ok(NodeType::Approval),
            "custom" => Ok(NodeType::Custom),
            "start" => Ok(NodeType::Start),
            "end" => Ok(NodeType::End),
            "router" => Ok(NodeType::Router),
            "agent" => Ok(NodeType::Agent),
            _ => Err(()),
        }
    }
}

/// Canvas position assigned by the layout engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A single workflow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique node ID, in first-seen source order
    pub id: String,
    /// Node type (best-effort keyword inference)
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Display label
    pub label: String,
    /// Node configuration from keyword arguments
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub config: IndexMap<String, Value>,
    /// Canvas position; absent until layout runs, mandatory afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl WorkflowNode {
    pub fn new(id: &str, node_type: NodeType) -> Self {
        Self {
            id: id.to_string(),
            node_type,
            label: id.to_string(),
            config: IndexMap::new(),
            position: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn with_config(mut self, config: IndexMap<String, Value>) -> Self {
        self.config = config;
        self
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    /// Source node ID
    pub from: String,
    /// Target node ID
    pub to: String,
    /// Condition for conditional edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl WorkflowEdge {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            condition: None,
        }
    }

    pub fn conditional(from: &str, to: &str, condition: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            condition: Some(condition.to_string()),
        }
    }
}

/// Sentinel target for conditional edges whose real branch targets are
/// chosen at run time and cannot be recovered by source analysis.
pub const CONDITIONAL_TARGET: &str = "conditional";

/// Complete workflow document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name
    pub name: String,
    /// Workflow description
    pub description: String,
    /// Nodes in first-seen source order
    pub nodes: Vec<WorkflowNode>,
    /// Edges
    pub edges: Vec<WorkflowEdge>,
    /// Node ID where execution begins
    pub entry_point: String,
    /// Typed fields of the shared execution state
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub state_schema: IndexMap<String, String>,
    /// Document metadata (provenance, layout algorithm, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Workflow {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry_point: String::new(),
            state_schema: IndexMap::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Look up a node by ID.
    pub fn get_node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Export to JSON (for web visualization)
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Export to DOT format (for debugging and visualization)
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        dot.push_str(&format!("digraph \"{}\" {{\n", self.name));
        dot.push_str("  rankdir=TB;\n");
        dot.push_str("  node [shape=box];\n\n");

        for node in &self.nodes {
            let shape = match node.node_type {
                NodeType::Start | NodeType::End => "ellipse",
                NodeType::Conditional | NodeType::Router => "diamond",
                NodeType::Approval => "hexagon",
                _ => "box",
            };
            dot.push_str(&format!(
                "  \"{}\" [label=\"{}\\n({})\", shape={}];\n",
                node.id, node.label, node.node_type, shape
            ));
        }

        dot.push('\n');

        for edge in &self.edges {
            let label = edge.condition.as_deref().unwrap_or("");
            let style = if edge.condition.is_some() {
                "dashed"
            } else {
                "solid"
            };
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
                edge.from, edge.to, label, style
            ));
        }

        dot.push_str("}\n");
        dot
    }
}
