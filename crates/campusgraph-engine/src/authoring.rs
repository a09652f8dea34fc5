//! Hand edits to the refined graph.
//!
//! Every successful edit invalidates the attached [`AdjacencyCache`].

use campusgraph_model::{EdgeFilter, EdgeKind, GraphError, NodeId};
use campusgraph_storage::{GraphStore, GraphTable, MutationBatch};

use crate::cache::AdjacencyCache;
use crate::config::PruneConfig;
use crate::rewire::delete_and_rewire;
use crate::view::GraphView;

pub struct GraphEditor<'a, S: GraphStore + ?Sized> {
    view: GraphView<'a, S>,
    cache: &'a AdjacencyCache,
}

impl<'a, S: GraphStore + ?Sized> GraphEditor<'a, S> {
    /// Editor over the refined table.
    pub fn new(store: &'a S, config: &'a PruneConfig, cache: &'a AdjacencyCache) -> Self {
        Self::for_table(store, GraphTable::Refined, config, cache)
    }

    pub fn for_table(
        store: &'a S,
        table: GraphTable,
        config: &'a PruneConfig,
        cache: &'a AdjacencyCache,
    ) -> Self {
        Self {
            view: GraphView::new(store, table, config),
            cache,
        }
    }

    /// Link two nodes with manual edges in both directions.
    ///
    /// Returns `false` without writing if the ids are equal, either node is
    /// missing, they are already linked by any edge, or they are not tagged
    /// with the same location.
    pub async fn connect_nodes(&self, a: NodeId, b: NodeId) -> Result<bool, GraphError> {
        if a == b {
            return Ok(false);
        }
        let store = self.view.store();
        let table = self.view.table();
        for id in [a, b] {
            match store.node(table, id).await {
                Ok(_) => {}
                Err(GraphError::NodeNotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
        if store.edge(table, a, b).await?.is_some() || store.edge(table, b, a).await?.is_some() {
            return Ok(false);
        }
        let location = store.location(table, a).await?;
        if location.is_none() || location != store.location(table, b).await? {
            tracing::debug!(a, b, "not connecting nodes outside a shared location");
            return Ok(false);
        }

        let mut batch = MutationBatch::new();
        batch.connect(a, b, EdgeKind::Manual);
        store.apply(table, batch).await?;
        self.cache.invalidate();
        tracing::info!(a, b, "connected nodes");
        Ok(true)
    }

    /// Remove the edges between two nodes. Returns `false` if there were none.
    pub async fn disconnect_nodes(&self, a: NodeId, b: NodeId) -> Result<bool, GraphError> {
        let store = self.view.store();
        let table = self.view.table();
        if store.edge(table, a, b).await?.is_none() && store.edge(table, b, a).await?.is_none() {
            return Ok(false);
        }

        let mut batch = MutationBatch::new();
        batch.disconnect(a, b);
        store.apply(table, batch).await?;
        self.cache.invalidate();
        tracing::info!(a, b, "disconnected nodes");
        Ok(true)
    }

    /// Delete a node, bridging its neighbours regardless of distance.
    pub async fn delete_node(&self, id: NodeId) -> Result<(), GraphError> {
        delete_and_rewire(&self.view, id, true, false).await?;
        self.cache.invalidate();
        tracing::info!(node = id, "deleted node");
        Ok(())
    }

    pub async fn set_label(&self, id: NodeId, label: Option<String>) -> Result<(), GraphError> {
        let mut batch = MutationBatch::new();
        batch.set_label(id, label);
        self.view.store().apply(self.view.table(), batch).await?;
        self.cache.invalidate();
        Ok(())
    }

    /// Manual edges leaving `id`.
    pub async fn manual_links(&self, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let store = self.view.store();
        let table = self.view.table();
        let mut links = Vec::new();
        for neighbour in store.neighbours(table, id, EdgeFilter::Any).await? {
            if store.edge(table, id, neighbour.id).await? == Some(EdgeKind::Manual) {
                links.push(neighbour.id);
            }
        }
        Ok(links)
    }
}
