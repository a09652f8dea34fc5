//! Bounded breadth-first neighbourhood search.

use std::collections::{HashSet, VecDeque};

use campusgraph_model::{planar_distance, vertical_separation, EdgeFilter, GraphError, Node, NodeId};
use campusgraph_storage::{GraphStore, Region};

use crate::config::SearchConfig;
use crate::view::GraphView;

/// Nodes around `start` that a viewer standing there could jump to.
///
/// Every node within `min_depth` hops is returned. Beyond that a node is only
/// included, and only expanded, if its distance to `start` is below
/// `distance_m` (planar) and `y_m` (vertical). Expansion stops at
/// `max_depth` hops. Edges of every kind are followed.
///
/// With physical proximity enabled, nodes within `distance_m` planar and
/// `y_m / 2` vertical of the start are added first and expanded as if they
/// were one hop away.
///
/// The start node is never part of the result, and no node appears twice.
pub async fn find_neighbourhood<S: GraphStore + ?Sized>(
    view: &GraphView<'_, S>,
    search: &SearchConfig,
    start: NodeId,
    distance_m: f64,
    y_m: f64,
) -> Result<Vec<Node>, GraphError> {
    let store = view.store();
    let table = view.table();
    let origin = view.position(start).await?;

    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
    let mut visited: HashSet<NodeId> = HashSet::from([start]);
    let mut included: HashSet<NodeId> = HashSet::new();
    let mut output = Vec::new();
    queue.push_back((start, 0));

    if search.use_physical_proximity {
        let region = Region::Cylinder {
            radius: distance_m,
            half_height: y_m / 2.0,
        };
        for id in view.nodes_within(start, region).await? {
            if included.insert(id) {
                output.push(view.node(id).await?);
            }
            if visited.insert(id) {
                queue.push_back((id, 1));
            }
        }
    }

    while let Some((id, depth)) = queue.pop_front() {
        if depth >= search.max_depth {
            continue;
        }

        for neighbour in store.neighbours(table, id, EdgeFilter::Any).await? {
            let node = view.node(neighbour.id).await?;
            let position = view.position_of(&node)?;
            let planar = planar_distance(&origin, &position)?;
            let vertical = vertical_separation(&origin, &position);

            let in_range = planar < distance_m && vertical < y_m;
            if !in_range && depth >= search.min_depth {
                continue;
            }

            if visited.insert(node.id) {
                queue.push_back((node.id, depth + 1));
            }
            if node.id != start && included.insert(node.id) {
                output.push(node);
            }
        }
    }

    tracing::debug!(start, found = output.len(), "neighbourhood search");
    Ok(output)
}
