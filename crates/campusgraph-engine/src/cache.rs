//! In-memory adjacency snapshot for repeated routing queries.
//!
//! Building the cache reads the whole table once; after that shortest paths
//! are answered without touching the store. Any write to the table makes the
//! snapshot stale, so writers must call [`AdjacencyCache::invalidate`].
//! [`crate::authoring::GraphEditor`] does this for every edit it applies.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use campusgraph_model::{euclidean_distance, GraphError, NodeId, Position};
use campusgraph_storage::GraphStore;
use parking_lot::RwLock;

use crate::view::GraphView;

/// Traversable adjacency with edge lengths in metres.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Adjacency {
    edges: HashMap<NodeId, Vec<(NodeId, f64)>>,
}

impl Adjacency {
    pub async fn build<S: GraphStore + ?Sized>(view: &GraphView<'_, S>) -> Result<Self, GraphError> {
        let mut positions: HashMap<NodeId, Position> = HashMap::new();
        for id in view.store().node_ids(view.table()).await? {
            positions.insert(id, view.position(id).await?);
        }

        let mut edges: HashMap<NodeId, Vec<(NodeId, f64)>> = HashMap::new();
        for edge in view.store().edges(view.table()).await? {
            if !edge.kind.is_traversable() {
                continue;
            }
            let (Some(from), Some(to)) = (positions.get(&edge.from), positions.get(&edge.to)) else {
                return Err(GraphError::ConstraintViolation(format!(
                    "edge ({}, {}) references a missing node",
                    edge.from, edge.to
                )));
            };
            edges
                .entry(edge.from)
                .or_default()
                .push((edge.to, euclidean_distance(from, to)));
        }
        Ok(Self { edges })
    }

    pub fn neighbours(&self, id: NodeId) -> &[(NodeId, f64)] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Dijkstra from `start` to `end`. Empty if unreachable.
    pub fn shortest_path(&self, start: NodeId, end: NodeId) -> Vec<NodeId> {
        #[derive(PartialEq)]
        struct Entry(f64, NodeId);
        impl Eq for Entry {}
        impl Ord for Entry {
            fn cmp(&self, other: &Self) -> Ordering {
                other.0.total_cmp(&self.0).then_with(|| other.1.cmp(&self.1))
            }
        }
        impl PartialOrd for Entry {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut dist: HashMap<NodeId, f64> = HashMap::from([(start, 0.0)]);
        let mut prev: HashMap<NodeId, NodeId> = HashMap::new();
        let mut heap = BinaryHeap::from([Entry(0.0, start)]);

        while let Some(Entry(cost, node)) = heap.pop() {
            if node == end {
                let mut path = vec![end];
                let mut at = end;
                while let Some(&p) = prev.get(&at) {
                    path.push(p);
                    at = p;
                }
                path.reverse();
                return path;
            }
            if cost > dist.get(&node).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            for &(next, length) in self.neighbours(node) {
                let candidate = cost + length;
                if candidate < dist.get(&next).copied().unwrap_or(f64::INFINITY) {
                    dist.insert(next, candidate);
                    prev.insert(next, node);
                    heap.push(Entry(candidate, next));
                }
            }
        }
        Vec::new()
    }
}

/// Lazily built, explicitly invalidated [`Adjacency`].
#[derive(Debug, Default)]
pub struct AdjacencyCache {
    current: RwLock<Option<Arc<Adjacency>>>,
}

impl AdjacencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn invalidate(&self) {
        if self.current.write().take().is_some() {
            tracing::debug!("adjacency cache invalidated");
        }
    }

    /// The cached adjacency, building it from `view` if stale.
    pub async fn get<S: GraphStore + ?Sized>(
        &self,
        view: &GraphView<'_, S>,
    ) -> Result<Arc<Adjacency>, GraphError> {
        let cached = self.current.read().clone();
        if let Some(adjacency) = cached {
            return Ok(adjacency);
        }
        let built = Arc::new(Adjacency::build(view).await?);
        tracing::debug!(edges = built.edge_count(), "adjacency cache built");
        *self.current.write() = Some(Arc::clone(&built));
        Ok(built)
    }

    pub async fn shortest_path<S: GraphStore + ?Sized>(
        &self,
        view: &GraphView<'_, S>,
        start: NodeId,
        end: NodeId,
    ) -> Result<Vec<NodeId>, GraphError> {
        Ok(self.get(view).await?.shortest_path(start, end))
    }
}
