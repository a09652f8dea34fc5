//! Distance metric and pruning thresholds.
//!
//! Keyframe positions are stored in raw reconstruction units. Everything in this
//! module works on positions that have already been scaled to metres (see
//! [`Position::scaled`]); thresholds are expressed in metres too.
//!
//! Pruning compares *planar* (XZ) distance, not full 3D distance, so that two
//! keyframes stacked on different floors never look close. Elevation is checked
//! separately against `y_dist_threshold`.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Raw reconstruction units to metres.
pub const DEFAULT_COORDS_TO_METRES: f64 = 40.0;

/// A 3D point. Y is up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build a position from loosely typed data (snapshot rows, pose columns).
    pub fn from_slice(values: &[f64]) -> Result<Self, GraphError> {
        match values {
            [x, y, z, ..] => Ok(Self::new(*x, *y, *z)),
            _ => Err(GraphError::invalid_geometry(format!(
                "position needs 3 components, got {}",
                values.len()
            ))),
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// Horizontal distance, ignoring elevation.
pub fn planar_distance(a: &Position, b: &Position) -> Result<f64, GraphError> {
    let distance = ((a.x - b.x).powi(2) + (a.z - b.z).powi(2)).sqrt();
    if distance.is_nan() || distance < 0.0 {
        return Err(GraphError::invalid_geometry(format!(
            "planar distance between {:?} and {:?} is {}",
            a.to_array(),
            b.to_array(),
            distance
        )));
    }
    Ok(distance)
}

pub fn vertical_separation(a: &Position, b: &Position) -> f64 {
    (a.y - b.y).abs()
}

pub fn euclidean_distance(a: &Position, b: &Position) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2) + (a.z - b.z).powi(2)).sqrt()
}

// ============================================================================
// Thresholds
// ============================================================================

/// One set of pruning thresholds, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Pairs closer than this (planar) are merge candidates.
    pub target_closeness: f64,
    /// Pairs at or below this are merged even if the bridging edges would be
    /// longer than `target_closeness`.
    pub always_merge_closeness: f64,
    /// Pairs further apart vertically are never merged.
    pub y_dist_threshold: f64,
}

impl Thresholds {
    pub const INDOOR: Thresholds = Thresholds {
        target_closeness: 2.0,
        always_merge_closeness: 0.5,
        y_dist_threshold: 1.0,
    };

    pub const OUTDOOR: Thresholds = Thresholds {
        target_closeness: 5.0,
        always_merge_closeness: 1.5,
        y_dist_threshold: 2.0,
    };

    /// Whether a pair at this planar distance is a merge candidate.
    pub fn is_close(&self, planar: f64) -> bool {
        planar < self.target_closeness || planar < self.always_merge_closeness
    }

    pub fn must_merge(&self, planar: f64) -> bool {
        planar <= self.always_merge_closeness
    }

    pub fn within_elevation(&self, vertical: f64) -> bool {
        vertical <= self.y_dist_threshold
    }

    /// Whether a bridging edge of this shape may be created.
    pub fn allows_bridge(&self, planar: f64, vertical: f64) -> bool {
        planar <= self.target_closeness && vertical <= self.y_dist_threshold
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        let values = [
            self.target_closeness,
            self.always_merge_closeness,
            self.y_dist_threshold,
        ];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(GraphError::invalid_geometry(format!(
                "thresholds must be finite and non-negative: {self:?}"
            )));
        }
        if self.always_merge_closeness >= self.target_closeness {
            return Err(GraphError::invalid_geometry(format!(
                "always_merge_closeness ({}) must be below target_closeness ({})",
                self.always_merge_closeness, self.target_closeness
            )));
        }
        Ok(())
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::INDOOR
    }
}

/// Indoor and outdoor threshold sets.
///
/// The outdoor set only applies when both ends of a pair are tagged outdoors;
/// anything unknown falls back to the stricter indoor set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub indoor: Thresholds,
    pub outdoor: Thresholds,
}

impl ThresholdProfile {
    pub fn select(&self, outdoors: bool) -> &Thresholds {
        if outdoors {
            &self.outdoor
        } else {
            &self.indoor
        }
    }

    pub fn for_pair(&self, a_outdoors: bool, b_outdoors: bool) -> &Thresholds {
        self.select(a_outdoors && b_outdoors)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.indoor.validate()?;
        self.outdoor.validate()
    }
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        Self {
            indoor: Thresholds::INDOOR,
            outdoor: Thresholds::OUTDOOR,
        }
    }
}
