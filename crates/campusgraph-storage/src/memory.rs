//! In-memory graph store with transactional batches.
//!
//! Tables are `BTreeMap`s so every scan is ordered by node id, which keeps
//! traversal order deterministic. A batch runs inside a [`Transaction`] that
//! records an undo entry for every write; any failure, including a failed
//! journal append, replays the undo log in reverse, leaving the table exactly
//! as it was.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use campusgraph_model::{Edge, EdgeFilter, EdgeKind, GraphError, Neighbour, Node, NodeId};
use parking_lot::RwLock;

use crate::journal::{JournalEntry, MutationJournal};
use crate::snapshot::GraphSnapshot;
use crate::store::{GraphStore, GraphTable, Mutation, MutationBatch, Region, StoreResult};

// ============================================================================
// Tables
// ============================================================================

/// One copy of the graph: node, edge and location tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GraphTables {
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<(NodeId, NodeId), EdgeKind>,
    /// Reverse index: target -> sources.
    incoming: BTreeMap<NodeId, BTreeSet<NodeId>>,
    locations: BTreeMap<NodeId, String>,
}

impl GraphTables {
    pub(crate) fn from_snapshot(snapshot: GraphSnapshot) -> StoreResult<Self> {
        let mut tables = Self::default();
        for node in snapshot.nodes {
            if tables.nodes.contains_key(&node.id) {
                return Err(GraphError::ConstraintViolation(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            tables.nodes.insert(node.id, node);
        }
        for edge in snapshot.edges {
            if tables.edges.contains_key(&(edge.from, edge.to)) {
                return Err(GraphError::ConstraintViolation(format!(
                    "duplicate edge ({}, {})",
                    edge.from, edge.to
                )));
            }
            tables.insert_edge(edge)?;
        }
        for (id, location) in snapshot.locations {
            if !tables.nodes.contains_key(&id) {
                return Err(GraphError::ConstraintViolation(format!(
                    "location row references missing node {id}"
                )));
            }
            tables.locations.insert(id, location);
        }
        Ok(tables)
    }

    pub(crate) fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edge_list(),
            locations: self.locations.clone(),
        }
    }

    fn edge_list(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .map(|(&(from, to), &kind)| Edge::new(from, to, kind))
            .collect()
    }

    /// Insert or replace an edge. Both endpoints must exist.
    fn insert_edge(&mut self, edge: Edge) -> StoreResult<Option<EdgeKind>> {
        for end in [edge.from, edge.to] {
            if !self.nodes.contains_key(&end) {
                return Err(GraphError::ConstraintViolation(format!(
                    "edge ({}, {}) references missing node {end}",
                    edge.from, edge.to
                )));
            }
        }
        self.incoming.entry(edge.to).or_default().insert(edge.from);
        Ok(self.edges.insert((edge.from, edge.to), edge.kind))
    }

    fn remove_edge(&mut self, from: NodeId, to: NodeId) -> Option<EdgeKind> {
        let kind = self.edges.remove(&(from, to))?;
        if let Some(sources) = self.incoming.get_mut(&to) {
            sources.remove(&from);
            if sources.is_empty() {
                self.incoming.remove(&to);
            }
        }
        Some(kind)
    }

    fn outgoing(&self, id: NodeId) -> impl Iterator<Item = (NodeId, EdgeKind)> + '_ {
        self.edges
            .range((id, NodeId::MIN)..=(id, NodeId::MAX))
            .map(|(&(_, to), &kind)| (to, kind))
    }

    fn out_degree(&self, id: NodeId, filter: EdgeFilter) -> usize {
        self.outgoing(id).filter(|(_, kind)| filter.accepts(*kind)).count()
    }

    fn edges_touching(&self, id: NodeId) -> Vec<Edge> {
        let mut touching: Vec<Edge> = self
            .outgoing(id)
            .map(|(to, kind)| Edge::new(id, to, kind))
            .collect();
        if let Some(sources) = self.incoming.get(&id) {
            touching.extend(
                sources
                    .iter()
                    .filter(|&&from| from != id)
                    .filter_map(|&from| self.edges.get(&(from, id)).map(|&k| Edge::new(from, id, k))),
            );
        }
        touching
    }
}

// ============================================================================
// Transaction
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug)]
enum Undo {
    RestoreEdge(Edge),
    RemoveEdge { from: NodeId, to: NodeId },
    RestoreLocation(NodeId, String),
    RestoreNode(Node),
    RestoreLabel(NodeId, Option<String>),
}

/// Applies mutations to one table, remembering how to undo them.
struct Transaction<'a> {
    tables: &'a mut GraphTables,
    undo: Vec<Undo>,
    state: TxState,
}

impl<'a> Transaction<'a> {
    fn begin(tables: &'a mut GraphTables) -> Self {
        Self {
            tables,
            undo: Vec::new(),
            state: TxState::Active,
        }
    }

    fn apply(&mut self, mutation: &Mutation) -> StoreResult<()> {
        debug_assert_eq!(self.state, TxState::Active);
        match mutation {
            Mutation::UpsertEdge(edge) => {
                let undo = match self.tables.insert_edge(*edge)? {
                    Some(previous) => Undo::RestoreEdge(Edge::new(edge.from, edge.to, previous)),
                    None => Undo::RemoveEdge {
                        from: edge.from,
                        to: edge.to,
                    },
                };
                self.undo.push(undo);
            }
            Mutation::DeleteEdge { from, to } => {
                if let Some(kind) = self.tables.remove_edge(*from, *to) {
                    self.undo.push(Undo::RestoreEdge(Edge::new(*from, *to, kind)));
                }
            }
            Mutation::DeleteEdgesOf(id) => {
                for edge in self.tables.edges_touching(*id) {
                    if self.tables.remove_edge(edge.from, edge.to).is_some() {
                        self.undo.push(Undo::RestoreEdge(edge));
                    }
                }
            }
            Mutation::DeleteLocation(id) => {
                if let Some(location) = self.tables.locations.remove(id) {
                    self.undo.push(Undo::RestoreLocation(*id, location));
                }
            }
            Mutation::DeleteNode(id) => {
                if !self.tables.edges_touching(*id).is_empty() {
                    return Err(GraphError::ConstraintViolation(format!(
                        "node {id} is still referenced by edges"
                    )));
                }
                if self.tables.locations.contains_key(id) {
                    return Err(GraphError::ConstraintViolation(format!(
                        "node {id} is still referenced by a location row"
                    )));
                }
                if let Some(node) = self.tables.nodes.remove(id) {
                    self.undo.push(Undo::RestoreNode(node));
                }
            }
            Mutation::SetLabel { id, label } => {
                let node = self
                    .tables
                    .nodes
                    .get_mut(id)
                    .ok_or(GraphError::NodeNotFound(*id))?;
                let previous = std::mem::replace(&mut node.label, label.clone());
                self.undo.push(Undo::RestoreLabel(*id, previous));
            }
        }
        Ok(())
    }

    fn commit(mut self) {
        self.undo.clear();
        self.state = TxState::Committed;
    }

    fn rollback(mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::RestoreEdge(edge) => {
                    // Endpoints are restored before their edges (reverse order).
                    let _ = self.tables.insert_edge(edge);
                }
                Undo::RemoveEdge { from, to } => {
                    self.tables.remove_edge(from, to);
                }
                Undo::RestoreLocation(id, location) => {
                    self.tables.locations.insert(id, location);
                }
                Undo::RestoreNode(node) => {
                    self.tables.nodes.insert(node.id, node);
                }
                Undo::RestoreLabel(id, label) => {
                    if let Some(node) = self.tables.nodes.get_mut(&id) {
                        node.label = label;
                    }
                }
            }
        }
        self.state = TxState::RolledBack;
    }
}

/// Apply every mutation of `batch`, returning the open transaction so the
/// caller decides whether it commits. Nothing is left applied on error.
fn stage_batch<'a>(tables: &'a mut GraphTables, batch: &MutationBatch) -> StoreResult<Transaction<'a>> {
    let mut tx = Transaction::begin(tables);
    for mutation in batch.iter() {
        if let Err(err) = tx.apply(mutation) {
            tx.rollback();
            return Err(err);
        }
    }
    Ok(tx)
}

fn apply_batch(tables: &mut GraphTables, batch: &MutationBatch) -> StoreResult<()> {
    stage_batch(tables, batch)?.commit();
    Ok(())
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    dense: GraphTables,
    refined: GraphTables,
}

impl StoreState {
    fn table(&self, table: GraphTable) -> &GraphTables {
        match table {
            GraphTable::Dense => &self.dense,
            GraphTable::Refined => &self.refined,
        }
    }

    fn table_mut(&mut self, table: GraphTable) -> &mut GraphTables {
        match table {
            GraphTable::Dense => &mut self.dense,
            GraphTable::Refined => &mut self.refined,
        }
    }

    fn replay(&mut self, entry: JournalEntry) -> StoreResult<()> {
        match entry {
            JournalEntry::CopyDenseToRefined => {
                self.refined = self.dense.clone();
                Ok(())
            }
            JournalEntry::Batch { table, batch } => apply_batch(self.table_mut(table), &batch),
        }
    }
}

/// Reference [`GraphStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryGraphStore {
    state: RwLock<StoreState>,
    journal: Option<MutationJournal>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `snapshot` as the dense graph. The refined graph starts empty.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> StoreResult<Self> {
        let dense = GraphTables::from_snapshot(snapshot)?;
        Ok(Self {
            state: RwLock::new(StoreState {
                dense,
                refined: GraphTables::default(),
            }),
            journal: None,
        })
    }

    /// Load a dense snapshot and replay the journal written against it.
    pub fn open(snapshot_path: &Path, journal_path: &Path) -> anyhow::Result<Self> {
        let snapshot = GraphSnapshot::load_json(snapshot_path)?;
        let mut store = Self::from_snapshot(snapshot)
            .with_context(|| format!("invalid graph snapshot {}", snapshot_path.display()))?;

        let journal = MutationJournal::open(journal_path)
            .with_context(|| format!("failed to open journal {}", journal_path.display()))?;
        let replayed = {
            let state = store.state.get_mut();
            journal
                .replay(|entry| {
                    state
                        .replay(entry)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
                })
                .with_context(|| format!("failed to replay journal {}", journal_path.display()))?
        };
        tracing::info!(
            snapshot = %snapshot_path.display(),
            journal = %journal_path.display(),
            replayed,
            "opened graph store"
        );

        store.journal = Some(journal);
        Ok(store)
    }

    /// Journal every committed write from now on.
    pub fn with_journal(mut self, journal: MutationJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn snapshot(&self, table: GraphTable) -> GraphSnapshot {
        self.state.read().table(table).to_snapshot()
    }

    pub fn node_count(&self, table: GraphTable) -> usize {
        self.state.read().table(table).nodes.len()
    }

    pub fn edge_count(&self, table: GraphTable) -> usize {
        self.state.read().table(table).edges.len()
    }

    fn append_journal(&self, entry: &JournalEntry) -> StoreResult<()> {
        if let Some(journal) = &self.journal {
            journal.append(entry).map_err(GraphError::storage)?;
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn node(&self, table: GraphTable, id: NodeId) -> StoreResult<Node> {
        self.state
            .read()
            .table(table)
            .nodes
            .get(&id)
            .cloned()
            .ok_or(GraphError::NodeNotFound(id))
    }

    async fn location(&self, table: GraphTable, id: NodeId) -> StoreResult<Option<String>> {
        Ok(self.state.read().table(table).locations.get(&id).cloned())
    }

    async fn first_traversable_node(&self, table: GraphTable) -> StoreResult<Option<NodeId>> {
        let state = self.state.read();
        let tables = state.table(table);
        Ok(tables
            .edges
            .iter()
            .find(|(_, kind)| kind.is_traversable())
            .map(|(&(from, _), _)| from))
    }

    async fn neighbours(
        &self,
        table: GraphTable,
        id: NodeId,
        filter: EdgeFilter,
    ) -> StoreResult<Vec<Neighbour>> {
        let state = self.state.read();
        let tables = state.table(table);
        Ok(tables
            .outgoing(id)
            .filter(|(_, kind)| filter.accepts(*kind))
            .filter_map(|(to, _)| {
                tables.nodes.get(&to).map(|node| Neighbour {
                    id: to,
                    timestamp: node.timestamp,
                    degree: tables.out_degree(to, EdgeFilter::Traversable),
                })
            })
            .collect())
    }

    async fn nodes_within(
        &self,
        table: GraphTable,
        centre: NodeId,
        region: Region,
    ) -> StoreResult<Vec<NodeId>> {
        let state = self.state.read();
        let tables = state.table(table);
        let origin = tables
            .nodes
            .get(&centre)
            .ok_or(GraphError::NodeNotFound(centre))?
            .position;
        Ok(tables
            .nodes
            .values()
            .filter(|node| node.id != centre && region.contains(&origin, &node.position))
            .map(|node| node.id)
            .collect())
    }

    async fn edge(
        &self,
        table: GraphTable,
        from: NodeId,
        to: NodeId,
    ) -> StoreResult<Option<EdgeKind>> {
        Ok(self.state.read().table(table).edges.get(&(from, to)).copied())
    }

    async fn apply(&self, table: GraphTable, batch: MutationBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write();
        let tx = stage_batch(state.table_mut(table), &batch)?;

        let entry = JournalEntry::Batch { table, batch };
        if let Err(err) = self.append_journal(&entry) {
            // Not durable, so not committed.
            tx.rollback();
            return Err(err);
        }
        tx.commit();
        Ok(())
    }

    async fn copy_dense_to_refined(&self) -> StoreResult<()> {
        let mut state = self.state.write();
        self.append_journal(&JournalEntry::CopyDenseToRefined)?;
        state.refined = state.dense.clone();
        tracing::debug!(
            nodes = state.refined.nodes.len(),
            edges = state.refined.edges.len(),
            "copied dense graph to refined"
        );
        Ok(())
    }

    async fn node_ids(&self, table: GraphTable) -> StoreResult<Vec<NodeId>> {
        Ok(self.state.read().table(table).nodes.keys().copied().collect())
    }

    async fn edges(&self, table: GraphTable) -> StoreResult<Vec<Edge>> {
        Ok(self.state.read().table(table).edge_list())
    }
}
