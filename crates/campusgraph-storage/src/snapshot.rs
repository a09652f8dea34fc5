//! Portable JSON form of one graph table.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use campusgraph_model::{Edge, EdgeKind, Node, NodeId, Position};
use serde::{Deserialize, Serialize};

/// Nodes, edges and location tags of one mapping session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub locations: BTreeMap<NodeId, String>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_json(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read graph snapshot {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse graph snapshot {}", path.display()))
    }

    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write graph snapshot {}", path.display()))
    }

    // ========================================================================
    // Builder helpers
    // ========================================================================

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add a node at a raw position, using its id as the timestamp.
    pub fn with_point(self, id: NodeId, x: f64, y: f64, z: f64) -> Self {
        self.with_node(Node::new(id, Position::new(x, y, z), id as f64))
    }

    /// Add `a -> b` and `b -> a`.
    pub fn with_link(mut self, a: NodeId, b: NodeId, kind: EdgeKind) -> Self {
        self.edges.push(Edge::new(a, b, kind));
        self.edges.push(Edge::new(b, a, kind));
        self
    }

    pub fn with_location(mut self, id: NodeId, location: impl Into<String>) -> Self {
        self.locations.insert(id, location.into());
        self
    }
}
