//! A* routing over traversable edges.
//!
//! Edge cost and heuristic are both straight-line 3D distance in metres, so
//! the heuristic is consistent and the first time a node is popped its cost
//! is final.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use campusgraph_model::{euclidean_distance, EdgeFilter, GraphError, NodeId, Position};
use campusgraph_storage::GraphStore;
use serde::{Deserialize, Serialize};

use crate::view::GraphView;

/// Where a route should end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathGoal {
    Node(NodeId),
    /// Head for `end`, but stop at the first node on the way whose label or
    /// location tag equals `label`.
    NodeOrMatch { end: NodeId, label: String },
    /// The cheapest node whose label or location tag equals `label`.
    Match(String),
}

impl PathGoal {
    fn target(&self) -> Option<NodeId> {
        match self {
            PathGoal::Node(end) | PathGoal::NodeOrMatch { end, .. } => Some(*end),
            PathGoal::Match(_) => None,
        }
    }

    fn label(&self) -> Option<&str> {
        match self {
            PathGoal::Node(_) => None,
            PathGoal::NodeOrMatch { label, .. } | PathGoal::Match(label) => Some(label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Open {
    f: f64,
    node: NodeId,
}

impl Eq for Open {}

impl Ord for Open {
    // Reversed for a min-heap; ties go to the lower id.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Open {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Cheapest route from `start` to `goal`, start first.
///
/// An unreachable goal yields an empty path. A node or position that cannot
/// be read is an error.
pub async fn find_path<S: GraphStore + ?Sized>(
    view: &GraphView<'_, S>,
    start: NodeId,
    goal: &PathGoal,
) -> Result<Vec<NodeId>, GraphError> {
    let goal_position = match goal.target() {
        Some(end) => Some(view.position(end).await?),
        None => None,
    };
    let heuristic = |position: &Position| {
        goal_position.map_or(0.0, |g| euclidean_distance(position, &g))
    };

    let mut positions: HashMap<NodeId, Position> = HashMap::new();
    let start_position = view.position(start).await?;
    positions.insert(start, start_position);

    let mut g_score: HashMap<NodeId, f64> = HashMap::from([(start, 0.0)]);
    let mut came_from: HashMap<NodeId, NodeId> = HashMap::new();
    let mut closed: HashSet<NodeId> = HashSet::new();
    let mut open = BinaryHeap::new();
    open.push(Open {
        f: heuristic(&start_position),
        node: start,
    });

    while let Some(Open { node: current, .. }) = open.pop() {
        if !closed.insert(current) {
            continue;
        }

        if reached(view, goal, current).await? {
            let path = reconstruct(&came_from, current);
            tracing::debug!(start, end = current, hops = path.len() - 1, "path found");
            return Ok(path);
        }

        let current_position = positions[&current];
        let current_g = g_score[&current];
        for neighbour in view
            .store()
            .neighbours(view.table(), current, EdgeFilter::Traversable)
            .await?
        {
            if closed.contains(&neighbour.id) {
                continue;
            }
            let position = match positions.get(&neighbour.id) {
                Some(position) => *position,
                None => {
                    let position = view.position(neighbour.id).await?;
                    positions.insert(neighbour.id, position);
                    position
                }
            };

            let tentative = current_g + euclidean_distance(&current_position, &position);
            if tentative < g_score.get(&neighbour.id).copied().unwrap_or(f64::INFINITY) {
                came_from.insert(neighbour.id, current);
                g_score.insert(neighbour.id, tentative);
                open.push(Open {
                    f: tentative + heuristic(&position),
                    node: neighbour.id,
                });
            }
        }
    }

    tracing::debug!(start, ?goal, expanded = closed.len(), "no path");
    Ok(Vec::new())
}

async fn reached<S: GraphStore + ?Sized>(
    view: &GraphView<'_, S>,
    goal: &PathGoal,
    node: NodeId,
) -> Result<bool, GraphError> {
    if goal.target() == Some(node) {
        return Ok(true);
    }
    let Some(label) = goal.label() else {
        return Ok(false);
    };
    if view.node(node).await?.label.as_deref() == Some(label) {
        return Ok(true);
    }
    let location = view.store().location(view.table(), node).await?;
    Ok(location.as_deref() == Some(label))
}

fn reconstruct(came_from: &HashMap<NodeId, NodeId>, end: NodeId) -> Vec<NodeId> {
    let mut path = vec![end];
    let mut node = end;
    while let Some(&previous) = came_from.get(&node) {
        path.push(previous);
        node = previous;
    }
    path.reverse();
    path
}
