//! CampusGraph keyframe graph model
//!
//! Shared types for every layer of the workspace:
//!
//! - `graph`: keyframe nodes, typed edges, poses and neighbour rows
//! - `geometry`: positions in metres, the planar (XZ) distance metric and the
//!   indoor/outdoor threshold sets used by pruning
//! - `error`: the single error type returned by stores and graph algorithms

pub mod error;
pub mod geometry;
pub mod graph;

pub use error::GraphError;
pub use geometry::{
    euclidean_distance, planar_distance, vertical_separation, Position, ThresholdProfile,
    Thresholds, DEFAULT_COORDS_TO_METRES,
};
pub use graph::{Edge, EdgeFilter, EdgeKind, Neighbour, Node, NodeId, Pose};
