//! Neighbourhood bounds and A* routing on small hand-built campuses.

use std::collections::{HashMap, VecDeque};

use approx::assert_relative_eq;
use campusgraph_engine::{GraphQueries, PathGoal, PruneConfig, SearchConfig};
use campusgraph_model::{euclidean_distance, EdgeKind, NodeId};
use campusgraph_storage::{GraphSnapshot, GraphStore, GraphTable, MemoryGraphStore};

fn metre_config() -> PruneConfig {
    PruneConfig {
        coords_to_metres: 1.0,
        ..PruneConfig::default()
    }
}

/// Loop 1-2-5-4-3-1 plus an island 6.
async fn loop_store() -> MemoryGraphStore {
    let snapshot = GraphSnapshot::new()
        .with_point(1, 0.0, 0.0, 0.0)
        .with_point(2, 2.0, 0.0, 0.0)
        .with_point(3, 0.0, 0.0, 2.0)
        .with_point(4, 2.0, 0.0, 4.0)
        .with_point(5, 4.0, 0.0, 2.0)
        .with_point(6, 20.0, 0.0, 20.0)
        .with_link(1, 2, EdgeKind::Direct)
        .with_link(2, 5, EdgeKind::Direct)
        .with_link(5, 4, EdgeKind::Covisibility)
        .with_link(4, 3, EdgeKind::Direct)
        .with_link(3, 1, EdgeKind::Synthetic);
    let store = MemoryGraphStore::from_snapshot(snapshot).unwrap();
    store.copy_dense_to_refined().await.unwrap();
    store
}

async fn route_length(store: &MemoryGraphStore, path: &[NodeId]) -> f64 {
    let mut positions = Vec::new();
    for &id in path {
        positions.push(store.node(GraphTable::Refined, id).await.unwrap().position);
    }
    positions
        .windows(2)
        .map(|pair| euclidean_distance(&pair[0], &pair[1]))
        .sum()
}

#[tokio::test]
async fn astar_takes_the_short_side_of_the_loop() {
    let store = loop_store().await;
    let config = metre_config();
    let queries = GraphQueries::new(&store, &config);

    let path = queries.find_path(1, &PathGoal::Node(4)).await.unwrap();
    assert_eq!(path, vec![1, 3, 4]);

    let short = route_length(&store, &path).await;
    let long = route_length(&store, &[1, 2, 5, 4]).await;
    assert_relative_eq!(short, 2.0 + 8f64.sqrt(), epsilon = 1e-9);
    assert!(short < long);
}

#[tokio::test]
async fn astar_reports_disconnected_pair_as_empty() {
    let store = loop_store().await;
    let config = metre_config();
    let queries = GraphQueries::new(&store, &config);

    assert!(queries.find_path(1, &PathGoal::Node(6)).await.unwrap().is_empty());
    assert!(queries.find_path(6, &PathGoal::Node(1)).await.unwrap().is_empty());
}

#[tokio::test]
async fn astar_can_route_on_the_dense_table() {
    let store = loop_store().await;
    let config = metre_config();
    let queries = GraphQueries::new(&store, &config);

    let path = queries
        .find_path_in(GraphTable::Dense, 2, &PathGoal::Node(3))
        .await
        .unwrap();
    assert_eq!(path, vec![2, 1, 3]);
}

/// Hop counts from `start` over edges of any kind.
async fn hops(store: &MemoryGraphStore, start: NodeId) -> HashMap<NodeId, usize> {
    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in store.edges(GraphTable::Dense).await.unwrap() {
        adjacency.entry(edge.from).or_default().push(edge.to);
    }
    let mut depth = HashMap::from([(start, 0usize)]);
    let mut queue = VecDeque::from([start]);
    while let Some(id) = queue.pop_front() {
        let d = depth[&id];
        for &next in adjacency.get(&id).into_iter().flatten() {
            if !depth.contains_key(&next) {
                depth.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }
    depth
}

#[tokio::test]
async fn neighbourhood_stays_within_max_depth() {
    // Zig-zag corridor, 0.5 m per hop so everything is in range.
    let mut snapshot = GraphSnapshot::new();
    for id in 1..=12 {
        let z = if id % 2 == 0 { 0.3 } else { 0.0 };
        snapshot = snapshot.with_point(id, id as f64 * 0.5, 0.0, z);
    }
    for id in 1..12 {
        let kind = if id % 3 == 0 { EdgeKind::Manual } else { EdgeKind::Direct };
        snapshot = snapshot.with_link(id, id + 1, kind);
    }
    let store = MemoryGraphStore::from_snapshot(snapshot).unwrap();
    let config = metre_config();
    let search = SearchConfig {
        use_physical_proximity: false,
        ..SearchConfig::default()
    };
    let queries = GraphQueries::new(&store, &config).with_search_config(search);

    let found = queries
        .find_neighbourhood(1, 50.0, 1.0, GraphTable::Dense)
        .await
        .unwrap();
    let depth = hops(&store, 1).await;

    let mut ids: Vec<NodeId> = found.iter().map(|n| n.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![2, 3, 4, 5, 6]);
    assert!(found.iter().all(|n| depth[&n.id] <= search.max_depth));
}

#[tokio::test]
async fn neighbourhood_with_proximity_reaches_past_walls() {
    // Two corridors side by side, only joined far away.
    let mut snapshot = GraphSnapshot::new();
    for i in 0..6 {
        snapshot = snapshot
            .with_point(10 + i, i as f64, 0.0, 0.0)
            .with_point(20 + i, i as f64, 0.0, 1.0);
    }
    for i in 0..5 {
        snapshot = snapshot
            .with_link(10 + i, 11 + i, EdgeKind::Direct)
            .with_link(20 + i, 21 + i, EdgeKind::Direct);
    }
    snapshot = snapshot.with_link(15, 25, EdgeKind::Direct);
    let store = MemoryGraphStore::from_snapshot(snapshot).unwrap();
    let config = metre_config();

    let plain = GraphQueries::new(&store, &config).with_search_config(SearchConfig {
        use_physical_proximity: false,
        ..SearchConfig::default()
    });
    let found = plain
        .find_neighbourhood(10, 1.5, 1.0, GraphTable::Dense)
        .await
        .unwrap();
    assert!(found.iter().all(|n| n.id < 20), "the other corridor is only joined at the far end");

    let nearby = GraphQueries::new(&store, &config);
    let found = nearby
        .find_neighbourhood(10, 1.5, 1.0, GraphTable::Dense)
        .await
        .unwrap();
    let mut ids: Vec<NodeId> = found.iter().map(|n| n.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![11, 12, 20, 21, 22]);
}

#[tokio::test]
async fn label_goals_route_to_named_places() {
    let store = loop_store().await;
    let mut batch = campusgraph_storage::MutationBatch::new();
    batch.set_label(5, Some("Lecture theatre".to_string()));
    store.apply(GraphTable::Refined, batch).await.unwrap();
    let config = metre_config();
    let queries = GraphQueries::new(&store, &config);

    let path = queries
        .find_path(1, &PathGoal::Match("Lecture theatre".to_string()))
        .await
        .unwrap();
    assert_eq!(path, vec![1, 2, 5]);
}
