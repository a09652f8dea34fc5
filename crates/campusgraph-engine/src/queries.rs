//! Read-only entry point for viewers: neighbourhoods and routes.

use campusgraph_model::{GraphError, Node, NodeId};
use campusgraph_storage::{GraphStore, GraphTable};

use crate::config::{PruneConfig, SearchConfig};
use crate::pathfind::{find_path, PathGoal};
use crate::search::find_neighbourhood;
use crate::view::GraphView;

pub struct GraphQueries<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    config: &'a PruneConfig,
    search: SearchConfig,
}

impl<'a, S: GraphStore + ?Sized> GraphQueries<'a, S> {
    pub fn new(store: &'a S, config: &'a PruneConfig) -> Self {
        Self {
            store,
            config,
            search: SearchConfig::default(),
        }
    }

    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub async fn find_neighbourhood(
        &self,
        start: NodeId,
        distance_m: f64,
        y_m: f64,
        table: GraphTable,
    ) -> Result<Vec<Node>, GraphError> {
        let view = GraphView::new(self.store, table, self.config);
        find_neighbourhood(&view, &self.search, start, distance_m, y_m).await
    }

    /// Route over the refined graph.
    pub async fn find_path(&self, start: NodeId, goal: &PathGoal) -> Result<Vec<NodeId>, GraphError> {
        self.find_path_in(GraphTable::Refined, start, goal).await
    }

    pub async fn find_path_in(
        &self,
        table: GraphTable,
        start: NodeId,
        goal: &PathGoal,
    ) -> Result<Vec<NodeId>, GraphError> {
        let view = GraphView::new(self.store, table, self.config);
        find_path(&view, start, goal).await
    }
}
