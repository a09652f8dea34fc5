//! Metre-scale, configuration-aware reads over one table of a store.

use std::collections::BTreeMap;

use campusgraph_model::{EdgeFilter, GraphError, Neighbour, Node, NodeId, Position};
use campusgraph_storage::{GraphStore, GraphTable, Region};

use crate::config::{PositionSource, PruneConfig};

/// A store seen through one table and one [`PruneConfig`].
pub struct GraphView<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    table: GraphTable,
    config: &'a PruneConfig,
}

impl<'a, S: GraphStore + ?Sized> Clone for GraphView<'a, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, S: GraphStore + ?Sized> Copy for GraphView<'a, S> {}

impl<'a, S: GraphStore + ?Sized> GraphView<'a, S> {
    pub fn new(store: &'a S, table: GraphTable, config: &'a PruneConfig) -> Self {
        Self {
            store,
            table,
            config,
        }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn table(&self) -> GraphTable {
        self.table
    }

    pub fn config(&self) -> &'a PruneConfig {
        self.config
    }

    pub async fn node(&self, id: NodeId) -> Result<Node, GraphError> {
        self.store.node(self.table, id).await
    }

    /// Position of a node in metres.
    pub async fn position(&self, id: NodeId) -> Result<Position, GraphError> {
        let node = self.node(id).await?;
        self.position_of(&node)
    }

    pub fn position_of(&self, node: &Node) -> Result<Position, GraphError> {
        let raw = match self.config.position_source {
            PositionSource::Translation => node.position,
            PositionSource::Pose => node
                .pose
                .ok_or_else(|| {
                    GraphError::invalid_geometry(format!("node {} has no pose", node.id))
                })?
                .camera_position()?,
        };
        Ok(raw.scaled(self.config.coords_to_metres))
    }

    /// Nodes other than `id` inside `region`, with the region given in metres
    /// around the position of `id`.
    ///
    /// Stored translations go through the store's spatial query. Pose-derived
    /// positions are not indexed, so the table is scanned.
    pub async fn nodes_within(&self, id: NodeId, region: Region) -> Result<Vec<NodeId>, GraphError> {
        match self.config.position_source {
            PositionSource::Translation => {
                let raw = match region {
                    Region::Sphere { radius } => Region::Sphere {
                        radius: self.config.to_raw(radius),
                    },
                    Region::Cylinder {
                        radius,
                        half_height,
                    } => Region::Cylinder {
                        radius: self.config.to_raw(radius),
                        half_height: self.config.to_raw(half_height),
                    },
                };
                self.store.nodes_within(self.table, id, raw).await
            }
            PositionSource::Pose => {
                let origin = self.position(id).await?;
                let mut found = Vec::new();
                for other in self.store.node_ids(self.table).await? {
                    if other != id && region.contains(&origin, &self.position(other).await?) {
                        found.push(other);
                    }
                }
                Ok(found)
            }
        }
    }

    pub async fn is_outdoors(&self, id: NodeId) -> Result<bool, GraphError> {
        let location = self.store.location(self.table, id).await?;
        Ok(location.as_deref() == Some(self.config.outdoor_location.as_str()))
    }

    /// Traversable neighbours of `id`, by ascending id.
    ///
    /// With `use_physical_proximity`, nodes within `target_closeness` (3D,
    /// indoor thresholds) are added whether or not an edge reaches them.
    pub async fn neighbours(
        &self,
        id: NodeId,
        use_physical_proximity: bool,
    ) -> Result<Vec<Neighbour>, GraphError> {
        let direct = self
            .store
            .neighbours(self.table, id, EdgeFilter::Traversable)
            .await?;
        if !use_physical_proximity {
            return Ok(direct);
        }

        let mut merged: BTreeMap<NodeId, Neighbour> = direct.into_iter().map(|n| (n.id, n)).collect();
        let radius = self.config.thresholds.indoor.target_closeness;
        for near in self.nodes_within(id, Region::Sphere { radius }).await? {
            if merged.contains_key(&near) {
                continue;
            }
            let node = self.node(near).await?;
            let degree = self
                .store
                .neighbours(self.table, near, EdgeFilter::Traversable)
                .await?
                .len();
            merged.insert(
                near,
                Neighbour {
                    id: near,
                    timestamp: node.timestamp,
                    degree,
                },
            );
        }
        Ok(merged.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use campusgraph_model::{EdgeKind, Pose};
    use campusgraph_storage::{GraphSnapshot, MemoryGraphStore};

    fn store() -> MemoryGraphStore {
        let snapshot = GraphSnapshot::new()
            .with_point(1, 0.0, 0.0, 0.0)
            .with_point(2, 0.025, 0.0, 0.0)
            .with_point(3, 0.0, 0.0, 0.03)
            .with_point(4, 1.0, 0.0, 0.0)
            .with_link(1, 2, EdgeKind::Direct)
            .with_link(1, 4, EdgeKind::Manual)
            .with_location(1, "outdoors")
            .with_location(2, "Library");
        MemoryGraphStore::from_snapshot(snapshot).unwrap()
    }

    #[tokio::test]
    async fn test_position_is_scaled_to_metres() {
        let store = store();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        let position = view.position(2).await.unwrap();
        assert_relative_eq!(position.x, 1.0);
        assert_relative_eq!(position.z, 0.0);
    }

    #[tokio::test]
    async fn test_position_from_pose() {
        let mut pose = Pose::IDENTITY;
        pose.0[3] = 0.5;
        pose.0[11] = 0.25;
        let snapshot = GraphSnapshot::new()
            .with_node(Node::new(7, Position::default(), 7.0).with_pose(pose))
            .with_point(8, 0.0, 0.0, 0.0);
        let store = MemoryGraphStore::from_snapshot(snapshot).unwrap();
        let config = PruneConfig {
            position_source: PositionSource::Pose,
            coords_to_metres: 2.0,
            ..PruneConfig::default()
        };
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        // Inverse translation is (-0.5, 0, -0.25); x is negated back.
        let position = view.position(7).await.unwrap();
        assert_relative_eq!(position.x, 1.0);
        assert_relative_eq!(position.z, -0.5);

        let err = view.position(8).await.unwrap_err();
        assert!(matches!(err, GraphError::InvalidGeometry(_)));
    }

    #[tokio::test]
    async fn test_outdoor_flag_follows_location_tag() {
        let store = store();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        assert!(view.is_outdoors(1).await.unwrap());
        assert!(!view.is_outdoors(2).await.unwrap());
        assert!(!view.is_outdoors(3).await.unwrap(), "no row means indoors");
    }

    #[tokio::test]
    async fn test_physical_proximity_adds_unlinked_nodes() {
        let store = store();
        let config = PruneConfig::default();
        let view = GraphView::new(&store, GraphTable::Dense, &config);

        let linked: Vec<_> = view
            .neighbours(1, false)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(linked, vec![2], "manual edge to 4 is skipped");

        // Node 3 is 1.2 m away, inside the 2 m indoor target.
        let nearby = view.neighbours(1, true).await.unwrap();
        let ids: Vec<_> = nearby.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(nearby[1].degree, 0);
        assert_eq!(nearby[1].timestamp, 3.0);
    }

    #[tokio::test]
    async fn test_proximity_follows_pose_positions() {
        let shifted = |x: f64| {
            let mut pose = Pose::IDENTITY;
            pose.0[3] = x;
            pose
        };
        // Translations and poses disagree: 2 sits on 1 by translation only,
        // 3 is near 1 by pose only.
        let snapshot = GraphSnapshot::new()
            .with_node(Node::new(1, Position::default(), 1.0).with_pose(Pose::IDENTITY))
            .with_node(Node::new(2, Position::default(), 2.0).with_pose(shifted(5.0)))
            .with_node(Node::new(3, Position::new(9.0, 0.0, 0.0), 3.0).with_pose(shifted(1.0)));
        let store = MemoryGraphStore::from_snapshot(snapshot).unwrap();

        let by_pose = PruneConfig {
            position_source: PositionSource::Pose,
            coords_to_metres: 1.0,
            ..PruneConfig::default()
        };
        let view = GraphView::new(&store, GraphTable::Dense, &by_pose);
        let ids: Vec<_> = view.neighbours(1, true).await.unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3]);

        let by_translation = PruneConfig {
            coords_to_metres: 1.0,
            ..PruneConfig::default()
        };
        let view = GraphView::new(&store, GraphTable::Dense, &by_translation);
        let ids: Vec<_> = view.neighbours(1, true).await.unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
