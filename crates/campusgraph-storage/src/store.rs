//! The repository interface the graph algorithms are written against.

use async_trait::async_trait;
use campusgraph_model::{Edge, EdgeFilter, EdgeKind, GraphError, Neighbour, Node, NodeId, Position};
use serde::{Deserialize, Serialize};

pub type StoreResult<T> = Result<T, GraphError>;

/// Which copy of the graph a call addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphTable {
    /// The graph as produced by mapping. Never written by the pruner.
    Dense,
    /// Working copy that pruning and authoring mutate.
    Refined,
}

impl GraphTable {
    pub const fn name(self) -> &'static str {
        match self {
            GraphTable::Dense => "dense",
            GraphTable::Refined => "refined",
        }
    }
}

/// Spatial query volume around a node, in raw units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    Sphere { radius: f64 },
    /// Planar radius plus a vertical band of `half_height` either side.
    Cylinder { radius: f64, half_height: f64 },
}

impl Region {
    pub fn contains(&self, centre: &Position, point: &Position) -> bool {
        let dx = point.x - centre.x;
        let dy = point.y - centre.y;
        let dz = point.z - centre.z;
        match *self {
            Region::Sphere { radius } => dx * dx + dy * dy + dz * dz <= radius * radius,
            Region::Cylinder {
                radius,
                half_height,
            } => dy.abs() <= half_height && dx * dx + dz * dz <= radius * radius,
        }
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// A single write against one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Insert an edge, replacing the kind if `(from, to)` already exists.
    UpsertEdge(Edge),
    DeleteEdge { from: NodeId, to: NodeId },
    /// Delete every edge with the node at either end.
    DeleteEdgesOf(NodeId),
    DeleteLocation(NodeId),
    DeleteNode(NodeId),
    SetLabel { id: NodeId, label: Option<String> },
}

/// Writes that must land together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    pub fn upsert_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> &mut Self {
        self.push(Mutation::UpsertEdge(Edge::new(from, to, kind)))
    }

    /// Upsert `a -> b` and `b -> a`.
    pub fn connect(&mut self, a: NodeId, b: NodeId, kind: EdgeKind) -> &mut Self {
        self.upsert_edge(a, b, kind).upsert_edge(b, a, kind)
    }

    /// Delete `a -> b` and `b -> a`.
    pub fn disconnect(&mut self, a: NodeId, b: NodeId) -> &mut Self {
        self.push(Mutation::DeleteEdge { from: a, to: b })
            .push(Mutation::DeleteEdge { from: b, to: a })
    }

    /// Remove a node with its edges and location row, in foreign-key order.
    pub fn remove_node(&mut self, id: NodeId) -> &mut Self {
        self.push(Mutation::DeleteEdgesOf(id))
            .push(Mutation::DeleteLocation(id))
            .push(Mutation::DeleteNode(id))
    }

    pub fn set_label(&mut self, id: NodeId, label: Option<String>) -> &mut Self {
        self.push(Mutation::SetLabel { id, label })
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Persistence for the dense and refined keyframe graphs.
///
/// Every call is a single round trip to the backing store. Writes only happen
/// through [`GraphStore::apply`], which is atomic, and through the bulk
/// dense-to-refined copy.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fails with `NodeNotFound` if the id is absent.
    async fn node(&self, table: GraphTable, id: NodeId) -> StoreResult<Node>;

    /// Location tag of a node, if it has one.
    async fn location(&self, table: GraphTable, id: NodeId) -> StoreResult<Option<String>>;

    /// Lowest node id with at least one traversable outgoing edge.
    async fn first_traversable_node(&self, table: GraphTable) -> StoreResult<Option<NodeId>>;

    /// Outgoing neighbours of `id` along edges accepted by `filter`, by ascending id.
    async fn neighbours(
        &self,
        table: GraphTable,
        id: NodeId,
        filter: EdgeFilter,
    ) -> StoreResult<Vec<Neighbour>>;

    /// Nodes inside `region` around `centre`, excluding `centre` itself.
    async fn nodes_within(
        &self,
        table: GraphTable,
        centre: NodeId,
        region: Region,
    ) -> StoreResult<Vec<NodeId>>;

    async fn edge(&self, table: GraphTable, from: NodeId, to: NodeId)
        -> StoreResult<Option<EdgeKind>>;

    /// Apply every mutation or none of them.
    async fn apply(&self, table: GraphTable, batch: MutationBatch) -> StoreResult<()>;

    /// Replace the refined graph with a fresh copy of the dense one.
    async fn copy_dense_to_refined(&self) -> StoreResult<()>;

    async fn node_ids(&self, table: GraphTable) -> StoreResult<Vec<NodeId>>;

    async fn edges(&self, table: GraphTable) -> StoreResult<Vec<Edge>>;
}
