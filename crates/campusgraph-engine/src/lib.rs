//! CampusGraph Engine
//!
//! Algorithms over a [`GraphStore`](campusgraph_storage::GraphStore):
//!
//! - `prune`: greedy sharpness-driven reduction of the refined graph
//! - `rewire`: node deletion that bridges the node's neighbours
//! - `search`: bounded BFS neighbourhoods for the tour viewer
//! - `pathfind`: A* routes, optionally ending at a labelled place
//! - `authoring`: manual connect, disconnect, delete and label edits
//! - `cache`: adjacency snapshot for repeated routing
//! - `sharpness`: image sharpness oracles
//!
//! ## Example
//!
//! ```no_run
//! use campusgraph_engine::{GraphPruner, LaplacianSharpness, CachedSharpness, PruneConfig};
//! use campusgraph_storage::MemoryGraphStore;
//! # async fn run(store: MemoryGraphStore) -> anyhow::Result<()> {
//! let oracle = CachedSharpness::new(LaplacianSharpness);
//! let report = GraphPruner::new(&store, &oracle, PruneConfig::default())
//!     .run()
//!     .await?;
//! println!("removed {} keyframes", report.deletion_count());
//! # Ok(())
//! # }
//! ```

pub mod authoring;
pub mod cache;
pub mod config;
pub mod pathfind;
pub mod prune;
pub mod queries;
pub mod rewire;
pub mod search;
pub mod sharpness;
pub mod view;

pub use authoring::GraphEditor;
pub use cache::{Adjacency, AdjacencyCache};
pub use config::{ImageLocator, PositionSource, PruneConfig, SearchConfig};
pub use pathfind::{find_path, PathGoal};
pub use prune::{Deletion, DeletionReason, GraphPruner, PruneReport, Refusal};
pub use queries::GraphQueries;
pub use rewire::{delete_and_rewire, rewire, RewireOutcome};
pub use search::find_neighbourhood;
pub use sharpness::{
    laplacian_variance, CachedSharpness, LaplacianSharpness, SharpnessOracle, StaticSharpness,
};
pub use view::GraphView;
