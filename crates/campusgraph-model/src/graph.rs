//! Keyframe nodes and the typed edges between them.

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::geometry::Position;

/// Keyframe identifier, as assigned by the mapping session.
pub type NodeId = i64;

/// Row-major 4x4 world-to-camera transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pose(pub [f64; 16]);

impl Pose {
    pub const IDENTITY: Pose = Pose([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Camera centre in raw units, taken from the inverted pose.
    ///
    /// X and Y are negated to match the viewer's axes, which is how the
    /// translation columns of the node table were produced.
    pub fn camera_position(&self) -> Result<Position, GraphError> {
        let matrix = Matrix4::from_row_slice(&self.0);
        let inverse = matrix.try_inverse().ok_or_else(|| {
            GraphError::invalid_geometry("pose matrix is singular and cannot be inverted")
        })?;
        let position = Position::new(-inverse[(0, 3)], -inverse[(1, 3)], inverse[(2, 3)]);
        if !position.to_array().iter().all(|v| v.is_finite()) {
            return Err(GraphError::invalid_geometry(format!(
                "pose inverse has a non-finite translation: {:?}",
                position.to_array()
            )));
        }
        Ok(position)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Translation in raw reconstruction units.
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<Pose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Capture time, used to find the keyframe's image on disk.
    pub timestamp: f64,
}

impl Node {
    pub fn new(id: NodeId, position: Position, timestamp: f64) -> Self {
        Self {
            id,
            position,
            pose: None,
            label: None,
            timestamp,
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Why two keyframes are linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Sequential/odometric neighbours.
    Direct,
    /// Bridge created by the pruner around a deleted node.
    Synthetic,
    /// Added by hand in the authoring tool.
    Manual,
    /// Loop closure / shared observation.
    Covisibility,
}

impl EdgeKind {
    /// Numeric tag used by the relational schema.
    pub const fn code(self) -> u8 {
        match self {
            EdgeKind::Direct => 0,
            EdgeKind::Synthetic => 1,
            EdgeKind::Manual => 2,
            EdgeKind::Covisibility => 3,
        }
    }

    pub const fn from_code(code: u8) -> Option<EdgeKind> {
        match code {
            0 => Some(EdgeKind::Direct),
            1 => Some(EdgeKind::Synthetic),
            2 => Some(EdgeKind::Manual),
            3 => Some(EdgeKind::Covisibility),
            _ => None,
        }
    }

    /// Edges the pruner and path finder walk along.
    pub const fn is_traversable(self) -> bool {
        !matches!(self, EdgeKind::Manual)
    }
}

/// Which edges a neighbour lookup follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeFilter {
    /// Direct, covisibility and synthetic edges.
    #[default]
    Traversable,
    Any,
}

impl EdgeFilter {
    pub fn accepts(self, kind: EdgeKind) -> bool {
        match self {
            EdgeFilter::Traversable => kind.is_traversable(),
            EdgeFilter::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Self { from, to, kind }
    }

    pub fn reversed(self) -> Self {
        Self::new(self.to, self.from, self.kind)
    }
}

/// A row of a neighbour lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbour {
    pub id: NodeId,
    pub timestamp: f64,
    /// Traversable out-degree of the neighbour itself.
    pub degree: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_edge_codes_round_trip() {
        for kind in [
            EdgeKind::Direct,
            EdgeKind::Synthetic,
            EdgeKind::Manual,
            EdgeKind::Covisibility,
        ] {
            assert_eq!(EdgeKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(EdgeKind::from_code(9), None);
    }

    #[test]
    fn test_manual_edges_are_not_traversable() {
        assert!(!EdgeFilter::Traversable.accepts(EdgeKind::Manual));
        assert!(EdgeFilter::Traversable.accepts(EdgeKind::Synthetic));
        assert!(EdgeFilter::Any.accepts(EdgeKind::Manual));
    }

    #[test]
    fn test_camera_position_inverts_translation() {
        // world-to-camera translation of (1, 2, 3) puts the camera at (-1, -2, -3),
        // then X and Y are flipped into the viewer frame.
        let mut values = Pose::IDENTITY.0;
        values[3] = 1.0;
        values[7] = 2.0;
        values[11] = 3.0;
        let position = Pose(values).camera_position().unwrap();
        assert_relative_eq!(position.x, 1.0);
        assert_relative_eq!(position.y, 2.0);
        assert_relative_eq!(position.z, -3.0);
    }

    #[test]
    fn test_singular_pose_is_invalid_geometry() {
        let pose = Pose([0.0; 16]);
        assert!(matches!(
            pose.camera_position(),
            Err(GraphError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_node_serializes_without_empty_optionals() {
        let node = Node::new(7, Position::new(1.0, 0.0, 2.0), 12.5);
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("pose").is_none());
        assert!(json.get("label").is_none());
        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }
}
