//! Greedy keyframe pruning.
//!
//! The refined graph is walked depth-first from the lowest-id node that has a
//! traversable edge. At each node every neighbour within the merge thresholds
//! is compared by image sharpness: a blurrier (or equal) neighbour is deleted
//! on the spot, and if any neighbour is sharper the current node is deleted
//! once all its neighbours have been evaluated. Deletions go through
//! [`rewire`], so connectivity is kept and over-long bridges are refused.
//!
//! A refused deletion can become legal once a neighbour has gone, and the
//! node that tried it is not revisited in the same walk. Walks are therefore
//! repeated from a fresh seed until one deletes nothing.
//!
//! ```text
//!        pop ──► mark visited ──► fetch neighbours ◄───────────┐
//!                                     │                        │ changed
//!                                     ▼                        │
//!                     close? ─► sharper? ─no─► delete neighbour ┘
//!                                     │yes
//!                                     ▼
//!                          current pending ──► delete current
//! ```

use std::collections::HashSet;
use std::time::{Duration, Instant};

use campusgraph_model::{planar_distance, vertical_separation, GraphError, NodeId, Thresholds};
use campusgraph_storage::{GraphStore, GraphTable};
use serde::Serialize;

use crate::config::PruneConfig;
use crate::rewire::{rewire, RewireOutcome};
use crate::sharpness::SharpnessOracle;
use crate::view::GraphView;

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    /// Close to the node being visited and no sharper than it.
    Blurrier,
    /// The node being visited had a sharper close neighbour.
    Superseded,
    /// Left with a single neighbour.
    DeadEnd,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deletion {
    pub node: NodeId,
    pub reason: DeletionReason,
    /// The node kept in its place, if the deletion came from a comparison.
    pub survivor: Option<NodeId>,
    pub bridges: Vec<(NodeId, NodeId)>,
    /// Whether bridges were checked against `thresholds`.
    pub distance_checked: bool,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refusal {
    pub node: NodeId,
    pub between: (NodeId, NodeId),
    pub planar: f64,
    pub vertical: f64,
}

/// Summary of a pruning run.
///
/// `deletions` accumulates over every pass. `refusals` are those of the final
/// pass, which are the ones still standing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneReport {
    pub seed: Option<NodeId>,
    pub passes: usize,
    pub visited: usize,
    pub deletions: Vec<Deletion>,
    pub refusals: Vec<Refusal>,
    pub elapsed: Duration,
}

impl PruneReport {
    pub fn deleted_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.deletions.iter().map(|d| d.node)
    }

    pub fn deletion_count(&self) -> usize {
        self.deletions.len()
    }
}

// ============================================================================
// Pruner
// ============================================================================

pub struct GraphPruner<'a, S: GraphStore + ?Sized, O: SharpnessOracle + ?Sized> {
    store: &'a S,
    oracle: &'a O,
    config: PruneConfig,
}

impl<'a, S: GraphStore + ?Sized, O: SharpnessOracle + ?Sized> GraphPruner<'a, S, O> {
    pub fn new(store: &'a S, oracle: &'a O, config: PruneConfig) -> Self {
        Self {
            store,
            oracle,
            config,
        }
    }

    pub fn config(&self) -> &PruneConfig {
        &self.config
    }

    /// Copy the dense graph to the refined table and prune the copy.
    ///
    /// Fails with [`GraphError::EmptyGraph`] if the copy has no node with a
    /// traversable edge to start from.
    pub async fn run(&self) -> Result<PruneReport, GraphError> {
        self.config.validate()?;
        self.store.copy_dense_to_refined().await?;
        tracing::info!("copied dense graph to refined");

        let seed = self
            .store
            .first_traversable_node(GraphTable::Refined)
            .await?
            .ok_or(GraphError::EmptyGraph)?;
        self.prune_from(seed).await
    }

    /// Prune the refined table as it stands. Safe to repeat: a pruned graph
    /// yields no further deletions.
    ///
    /// A table whose nodes have no traversable edges left is already pruned
    /// and gives an empty report. A table with no nodes at all is
    /// [`GraphError::EmptyGraph`].
    pub async fn prune_in_place(&self) -> Result<PruneReport, GraphError> {
        self.config.validate()?;
        match self.store.first_traversable_node(GraphTable::Refined).await? {
            Some(seed) => self.prune_from(seed).await,
            None if self.store.node_ids(GraphTable::Refined).await?.is_empty() => {
                Err(GraphError::EmptyGraph)
            }
            None => {
                tracing::info!("no traversable edges left, nothing to prune");
                Ok(PruneReport::default())
            }
        }
    }

    async fn prune_from(&self, seed: NodeId) -> Result<PruneReport, GraphError> {
        let started = Instant::now();
        let view = GraphView::new(self.store, GraphTable::Refined, &self.config);
        tracing::info!(seed, "pruning refined graph");

        let mut report = PruneReport {
            seed: Some(seed),
            ..PruneReport::default()
        };
        let mut next = Some(seed);
        while let Some(seed) = next {
            report.passes += 1;
            report.refusals.clear();
            let before = report.deletions.len();
            self.pass(&view, seed, &mut report).await?;

            let deleted = report.deletions.len() - before;
            tracing::debug!(pass = report.passes, seed, deleted, "pruning pass finished");
            if deleted == 0 {
                break;
            }
            next = self.store.first_traversable_node(GraphTable::Refined).await?;
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            passes = report.passes,
            visited = report.visited,
            deleted = report.deletions.len(),
            refused = report.refusals.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pruning finished"
        );
        Ok(report)
    }

    /// One depth-first walk from `seed`.
    async fn pass(
        &self,
        view: &GraphView<'_, S>,
        seed: NodeId,
        report: &mut PruneReport,
    ) -> Result<(), GraphError> {
        let mut stack = vec![seed];
        let mut visited: HashSet<NodeId> = HashSet::new();

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            report.visited += 1;
            self.visit(view, current, &mut stack, &mut visited, report)
                .await?;
        }
        Ok(())
    }

    async fn visit(
        &self,
        view: &GraphView<'_, S>,
        current: NodeId,
        stack: &mut Vec<NodeId>,
        visited: &mut HashSet<NodeId>,
        report: &mut PruneReport,
    ) -> Result<(), GraphError> {
        let node = view.node(current).await?;
        let position = view.position_of(&node)?;
        let outdoors = view.is_outdoors(current).await?;
        let mut current_sharpness = None;

        let mut checked: HashSet<NodeId> = HashSet::new();
        let mut superseded_by = None;
        let mut changed = true;

        while changed && superseded_by.is_none() {
            changed = false;
            let neighbours: Vec<_> = view
                .neighbours(current, false)
                .await?
                .into_iter()
                .filter(|n| n.id != current)
                .collect();

            if self.config.prune_dead_ends && neighbours.len() == 1 {
                let only = neighbours[0].id;
                if !visited.contains(&only) {
                    stack.push(only);
                }
                let outcome = rewire(view, current, false, outdoors).await?;
                self.record(report, current, DeletionReason::DeadEnd, None, true, outdoors, outcome);
                return Ok(());
            }

            for neighbour in neighbours {
                if !visited.contains(&neighbour.id) {
                    stack.push(neighbour.id);
                }
                if !checked.insert(neighbour.id) {
                    continue;
                }

                let neighbour_outdoors = view.is_outdoors(neighbour.id).await?;
                let pair_outdoors = outdoors && neighbour_outdoors;
                let thresholds = self.config.thresholds.for_pair(outdoors, neighbour_outdoors);

                let neighbour_position = view.position(neighbour.id).await?;
                let planar = planar_distance(&position, &neighbour_position)?;
                let vertical = vertical_separation(&position, &neighbour_position);
                if !thresholds.within_elevation(vertical) || !thresholds.is_close(planar) {
                    continue;
                }

                let mine = match current_sharpness {
                    Some(score) => score,
                    None => {
                        let score = self.sharpness(node.timestamp).await;
                        current_sharpness = Some(score);
                        score
                    }
                };
                let theirs = self.sharpness(neighbour.timestamp).await;

                if theirs <= mine {
                    let ignore = thresholds.must_merge(planar);
                    let outcome = rewire(view, neighbour.id, ignore, pair_outdoors).await?;
                    if outcome.is_deleted() {
                        changed = true;
                        visited.insert(neighbour.id);
                    }
                    self.record(
                        report,
                        neighbour.id,
                        DeletionReason::Blurrier,
                        Some(current),
                        !ignore,
                        pair_outdoors,
                        outcome,
                    );
                } else if superseded_by.is_none() {
                    tracing::debug!(
                        node = current,
                        sharper = neighbour.id,
                        mine,
                        theirs,
                        "current node superseded"
                    );
                    superseded_by = Some(neighbour.id);
                }
            }
        }

        if let Some(survivor) = superseded_by {
            for neighbour in view.neighbours(current, false).await? {
                if neighbour.id != current
                    && !checked.contains(&neighbour.id)
                    && !visited.contains(&neighbour.id)
                {
                    stack.push(neighbour.id);
                }
            }
            let outcome = rewire(view, current, false, outdoors).await?;
            self.record(
                report,
                current,
                DeletionReason::Superseded,
                Some(survivor),
                true,
                outdoors,
                outcome,
            );
        }
        Ok(())
    }

    async fn sharpness(&self, timestamp: f64) -> f64 {
        let image = self.config.images.image_path(timestamp);
        self.oracle.sharpness(&image).await
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        report: &mut PruneReport,
        node: NodeId,
        reason: DeletionReason,
        survivor: Option<NodeId>,
        distance_checked: bool,
        outdoors: bool,
        outcome: RewireOutcome,
    ) {
        match outcome {
            RewireOutcome::Deleted { bridges } => {
                tracing::debug!(node, ?reason, ?survivor, bridges = bridges.len(), "pruned node");
                report.deletions.push(Deletion {
                    node,
                    reason,
                    survivor,
                    bridges,
                    distance_checked,
                    thresholds: *self.config.thresholds.select(outdoors),
                });
            }
            RewireOutcome::Refused {
                between,
                planar,
                vertical,
            } => {
                report.refusals.push(Refusal {
                    node,
                    between,
                    planar,
                    vertical,
                });
            }
        }
    }
}
