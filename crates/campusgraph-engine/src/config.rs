//! Engine configuration.
//!
//! Every struct has a `Default` matching the values the campus capture
//! sessions were tuned for, and deserializes with missing fields filled in
//! from that default, so a JSON file only needs to name what it overrides.

use std::path::{Path, PathBuf};

use anyhow::Context;
use campusgraph_model::{GraphError, ThresholdProfile, DEFAULT_COORDS_TO_METRES};
use serde::{Deserialize, Serialize};

/// Where a node's position in metres comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    /// The stored translation columns.
    #[default]
    Translation,
    /// The camera centre recovered by inverting the stored pose.
    Pose,
}

/// Resolves keyframe images from capture timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageLocator {
    pub dir: PathBuf,
    /// Appended to the file stem, including the dot.
    pub extension: String,
}

impl ImageLocator {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// `<dir>/<timestamp to 5 decimals><extension>`
    pub fn image_path(&self, timestamp: f64) -> PathBuf {
        self.dir.join(format!("{:.5}{}", timestamp, self.extension))
    }
}

impl Default for ImageLocator {
    fn default() -> Self {
        Self::new("keyframes", ".png")
    }
}

/// Settings for pruning and for the geometry shared with search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    pub thresholds: ThresholdProfile,
    /// Location tag that selects the outdoor thresholds.
    pub outdoor_location: String,
    /// Raw reconstruction units to metres.
    pub coords_to_metres: f64,
    pub images: ImageLocator,
    pub position_source: PositionSource,
    /// Delete nodes left with a single neighbour.
    pub prune_dead_ends: bool,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdProfile::default(),
            outdoor_location: "outdoors".to_string(),
            coords_to_metres: DEFAULT_COORDS_TO_METRES,
            images: ImageLocator::default(),
            position_source: PositionSource::Translation,
            prune_dead_ends: false,
        }
    }
}

impl PruneConfig {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: PruneConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.thresholds.validate()?;
        if !self.coords_to_metres.is_finite() || self.coords_to_metres <= 0.0 {
            return Err(GraphError::invalid_geometry(format!(
                "coords_to_metres must be positive, got {}",
                self.coords_to_metres
            )));
        }
        Ok(())
    }

    /// Convert a length in metres to raw units.
    pub fn to_raw(&self, metres: f64) -> f64 {
        metres / self.coords_to_metres
    }
}

/// Bounds for [`find_neighbourhood`](crate::search::find_neighbourhood).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Hops expanded regardless of distance.
    pub min_depth: usize,
    pub max_depth: usize,
    /// Seed the result with nodes near the start, connected or not.
    pub use_physical_proximity: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_depth: 2,
            max_depth: 5,
            use_physical_proximity: true,
        }
    }
}
