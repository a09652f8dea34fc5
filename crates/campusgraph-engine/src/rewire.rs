//! Node deletion with neighbour rewiring.
//!
//! Removing a keyframe must not disconnect the graph, so every pair of its
//! traversable neighbours is linked with a synthetic edge. Unless the caller
//! waives the check, a deletion whose bridges would be too long or too steep
//! is refused and nothing is written.

use campusgraph_model::{
    planar_distance, vertical_separation, EdgeFilter, EdgeKind, GraphError, NodeId, Position,
};
use campusgraph_storage::{GraphStore, MutationBatch};

use crate::view::GraphView;

/// What [`rewire`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum RewireOutcome {
    /// The node is gone; each pair was linked both ways.
    Deleted { bridges: Vec<(NodeId, NodeId)> },
    /// A bridge between `between` would have broken the thresholds.
    Refused {
        between: (NodeId, NodeId),
        planar: f64,
        vertical: f64,
    },
}

impl RewireOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, RewireOutcome::Deleted { .. })
    }
}

/// Delete `id` and bridge its neighbours. Returns `false` on refusal.
pub async fn delete_and_rewire<S: GraphStore + ?Sized>(
    view: &GraphView<'_, S>,
    id: NodeId,
    ignore_distance_check: bool,
    outdoors: bool,
) -> Result<bool, GraphError> {
    Ok(rewire(view, id, ignore_distance_check, outdoors)
        .await?
        .is_deleted())
}

/// [`delete_and_rewire`], reporting the bridges created or the pair that
/// caused a refusal.
///
/// `outdoors` selects the threshold set the bridges are checked against.
pub async fn rewire<S: GraphStore + ?Sized>(
    view: &GraphView<'_, S>,
    id: NodeId,
    ignore_distance_check: bool,
    outdoors: bool,
) -> Result<RewireOutcome, GraphError> {
    // Fails with NodeNotFound before anything is written.
    view.node(id).await?;

    let mut neighbours: Vec<NodeId> = view
        .store()
        .neighbours(view.table(), id, EdgeFilter::Traversable)
        .await?
        .into_iter()
        .map(|n| n.id)
        .filter(|&n| n != id)
        .collect();
    neighbours.dedup();

    let mut positions: Vec<Position> = Vec::new();
    if !ignore_distance_check {
        for &n in &neighbours {
            positions.push(view.position(n).await?);
        }
    }

    let thresholds = view.config().thresholds.select(outdoors);
    let mut batch = MutationBatch::new();
    let mut bridges = Vec::new();
    for i in 0..neighbours.len() {
        for j in (i + 1)..neighbours.len() {
            let (a, b) = (neighbours[i], neighbours[j]);
            if !ignore_distance_check {
                let planar = planar_distance(&positions[i], &positions[j])?;
                let vertical = vertical_separation(&positions[i], &positions[j]);
                if !thresholds.allows_bridge(planar, vertical) {
                    tracing::debug!(
                        node = id,
                        from = a,
                        to = b,
                        planar,
                        vertical,
                        "refusing deletion, bridge too long"
                    );
                    return Ok(RewireOutcome::Refused {
                        between: (a, b),
                        planar,
                        vertical,
                    });
                }
            }
            batch.connect(a, b, EdgeKind::Synthetic);
            bridges.push((a, b));
        }
    }
    batch.remove_node(id);

    view.store().apply(view.table(), batch).await?;
    tracing::debug!(node = id, bridges = bridges.len(), ignore_distance_check, "deleted node");

    Ok(RewireOutcome::Deleted { bridges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PruneConfig;
    use campusgraph_storage::{GraphSnapshot, GraphTable, MemoryGraphStore};

    /// Star around node 1 with arms at 1 m (2), 1 m (3) and 3 m (4).
    fn star() -> MemoryGraphStore {
        let snapshot = GraphSnapshot::new()
            .with_point(1, 0.0, 0.0, 0.0)
            .with_point(2, 0.025, 0.0, 0.0)
            .with_point(3, 0.0, 0.0, 0.025)
            .with_point(4, -0.075, 0.0, 0.0)
            .with_link(1, 2, EdgeKind::Direct)
            .with_link(1, 3, EdgeKind::Covisibility)
            .with_link(1, 4, EdgeKind::Direct)
            .with_location(1, "Atrium");
        MemoryGraphStore::from_snapshot(snapshot).unwrap()
    }

    #[tokio::test]
    async fn test_refuses_long_bridge_and_writes_nothing() {
        let store = star();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);
        let before = store.snapshot(GraphTable::Dense);

        // 2 <-> 4 would be 4 m, over the 2 m indoor target.
        let outcome = rewire(&view, 1, false, false).await.unwrap();
        assert!(matches!(outcome, RewireOutcome::Refused { between: (2, 4), .. }));
        assert_eq!(store.snapshot(GraphTable::Dense), before);
    }

    #[tokio::test]
    async fn test_outdoor_thresholds_allow_longer_bridges() {
        let store = star();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        assert!(delete_and_rewire(&view, 1, false, true).await.unwrap());
        for (a, b) in [(2, 3), (2, 4), (3, 4)] {
            assert_eq!(
                store.edge(GraphTable::Dense, a, b).await.unwrap(),
                Some(EdgeKind::Synthetic)
            );
            assert_eq!(
                store.edge(GraphTable::Dense, b, a).await.unwrap(),
                Some(EdgeKind::Synthetic)
            );
        }
        assert!(store.node(GraphTable::Dense, 1).await.is_err());
        assert_eq!(store.location(GraphTable::Dense, 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ignoring_distance_always_deletes() {
        let store = star();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        let outcome = rewire(&view, 1, true, false).await.unwrap();
        assert_eq!(
            outcome,
            RewireOutcome::Deleted {
                bridges: vec![(2, 3), (2, 4), (3, 4)]
            }
        );
        assert_eq!(store.edge_count(GraphTable::Dense), 6);
    }

    #[tokio::test]
    async fn test_manual_edges_are_dropped_not_bridged() {
        let snapshot = GraphSnapshot::new()
            .with_point(1, 0.0, 0.0, 0.0)
            .with_point(2, 0.025, 0.0, 0.0)
            .with_point(3, 0.0, 0.0, 0.025)
            .with_link(1, 2, EdgeKind::Direct)
            .with_link(1, 3, EdgeKind::Manual);
        let store = MemoryGraphStore::from_snapshot(snapshot).unwrap();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        let outcome = rewire(&view, 1, false, false).await.unwrap();
        assert_eq!(outcome, RewireOutcome::Deleted { bridges: vec![] });
        assert!(store.edges(GraphTable::Dense).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_node_is_an_error() {
        let store = star();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        let err = delete_and_rewire(&view, 9, true, false).await.unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound(9));
    }
}
