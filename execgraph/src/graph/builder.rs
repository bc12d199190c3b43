//! Reconstructs the execution graph from flat execution records.
//!
//! Placement of a record, in priority order:
//! 1. fan-out child of a `CHILDREN` parent listing its plan node, or head of
//!    a `CHILD_CHAIN` parent → parent's `edges`
//! 2. has a previous sibling → previous's `next_ids`, own `prev_ids`
//! 3. plain nesting under a parent → parent's `edges`
//!
//! A `CHILD_CHAIN` container therefore only ever lists its chain head in
//! `edges`; later links hang off their predecessor.

use super::{EdgeSet, Graph, VertexView};
use crate::config::GraphConfig;
use crate::core::{ExecutionMode, ExecutionRecord};
use crate::errors::{GraphConstructionError, ReferenceKind};
use crate::observability::SpanTimer;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Where a record attaches.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    /// Structural child of a fan-out container (or chain head).
    FanOutChild(String),
    /// Next link after the given sibling.
    ChainSuccessor(String),
    /// Plain nesting under the given parent.
    NestedChild(String),
}

/// Where a record outside the placed vertices stands in a partial graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ancestry {
    /// Nested below a placed vertex or the root.
    Inside,
    /// Known to hang off an execution outside the graph.
    Outside,
    /// Its ancestry has not arrived yet.
    Unknown,
}

/// Owns all mutable graph state while records are ingested.
///
/// Callers only ever see the finished [`Graph`].
#[derive(Debug)]
pub struct GraphBuilder {
    root_id: String,
    partial: bool,
    config: GraphConfig,
    vertices: BTreeMap<String, VertexView>,
    adjacency: BTreeMap<String, EdgeSet>,
    pending: BTreeMap<String, ExecutionRecord>,
    excluded: BTreeSet<String>,
}

impl GraphBuilder {
    /// Creates an empty builder for a graph rooted at `root_id`.
    #[must_use]
    pub fn new(root_id: impl Into<String>, partial: bool) -> Self {
        Self {
            root_id: root_id.into(),
            partial,
            config: GraphConfig::default(),
            vertices: BTreeMap::new(),
            adjacency: BTreeMap::new(),
            pending: BTreeMap::new(),
            excluded: BTreeSet::new(),
        }
    }

    /// Seeds a builder with an existing graph, for incremental extension.
    #[must_use]
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            root_id: graph.root_id.clone(),
            partial: graph.partial,
            config: GraphConfig::default(),
            vertices: graph.vertices.clone(),
            adjacency: graph.adjacency.clone(),
            pending: graph.pending.clone(),
            excluded: graph.excluded.clone(),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a batch of records.
    ///
    /// Records may arrive in any order. A record whose parent or previous
    /// sibling is neither placed nor in the batch is held back together with
    /// everything hanging off it, and retried with every later batch. Records
    /// already in the graph only refresh their vertex.
    pub fn ingest(mut self, records: &[ExecutionRecord]) -> Result<Self, GraphConstructionError> {
        let mut incoming = std::mem::take(&mut self.pending);
        for record in records {
            incoming.insert(record.id.clone(), record.clone());
        }

        let mut batch: Vec<ExecutionRecord> = if self.partial {
            self.reachable(incoming)?
        } else {
            incoming.into_values().collect()
        };
        batch.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let stray_roots: Vec<String> = batch
            .iter()
            .filter(|r| r.is_root() && r.id != self.root_id && !self.vertices.contains_key(&r.id))
            .map(|r| r.id.clone())
            .collect();
        if !stray_roots.is_empty() {
            let mut ids = stray_roots;
            ids.push(self.root_id.clone());
            ids.sort();
            ids.dedup();
            return Err(GraphConstructionError::MultipleRoots { ids });
        }

        let placeable = self.placeable(&batch);
        let mut fresh = Vec::with_capacity(batch.len());
        for record in batch {
            if !placeable.contains(record.id.as_str()) {
                self.pending.insert(record.id.clone(), record);
                continue;
            }
            let vertex = VertexView::from_record(&record);
            if self.vertices.insert(record.id.clone(), vertex).is_none() {
                self.adjacency.entry(record.id.clone()).or_default();
                fresh.push(record);
            }
        }

        for record in &fresh {
            if record.id == self.root_id {
                continue;
            }
            let placement = self.resolve(record)?;
            self.attach(record, placement);
        }

        if !self.pending.is_empty() {
            debug!(
                root_id = %self.root_id,
                pending = self.pending.len(),
                "Holding records until their referents arrive"
            );
        }
        Ok(self)
    }

    /// Finishes construction.
    #[must_use]
    pub fn build(self) -> Graph {
        Graph {
            root_id: self.root_id,
            partial: self.partial,
            vertices: self.vertices,
            adjacency: self.adjacency,
            pending: self.pending,
            excluded: self.excluded,
        }
    }

    /// Ids in `batch` whose parent and previous sibling are placed, or will
    /// be once the batch is.
    fn placeable(&self, batch: &[ExecutionRecord]) -> HashSet<String> {
        let mut placed: HashSet<String> = self.vertices.keys().cloned().collect();
        let known = |reference: Option<&String>, placed: &HashSet<String>| {
            reference.map_or(true, |id| placed.contains(id))
        };

        loop {
            let before = placed.len();
            for record in batch {
                if placed.contains(&record.id) {
                    continue;
                }
                let ready = record.id == self.root_id
                    || (known(record.parent_id.as_ref(), &placed)
                        && known(record.previous_id.as_ref(), &placed));
                if ready {
                    placed.insert(record.id.clone());
                }
            }
            if placed.len() == before {
                return placed;
            }
        }
    }

    /// Splits a partial batch by ancestry.
    ///
    /// Records nested (at any depth) below placed vertices or the root are
    /// returned. Records with unknown ancestry are held back. Records known
    /// to lie outside are dropped, or rejected when the configuration asks
    /// for strict extension. A fresh build knows every record, so nothing it
    /// leaves out can be unknown.
    fn reachable(
        &mut self,
        incoming: BTreeMap<String, ExecutionRecord>,
    ) -> Result<Vec<ExecutionRecord>, GraphConstructionError> {
        let building = self.vertices.is_empty();

        let mut reached: HashSet<String> = self.vertices.keys().cloned().collect();
        reached.insert(self.root_id.clone());
        loop {
            let before = reached.len();
            for record in incoming.values() {
                if record.parent_id.as_ref().is_some_and(|p| reached.contains(p)) {
                    reached.insert(record.id.clone());
                }
            }
            if reached.len() == before {
                break;
            }
        }

        let ancestry: BTreeMap<String, Ancestry> = incoming
            .keys()
            .map(|id| {
                let ancestry = if reached.contains(id) {
                    Ancestry::Inside
                } else if building {
                    Ancestry::Outside
                } else {
                    self.trace_ancestry(id, &incoming)
                };
                (id.clone(), ancestry)
            })
            .collect();

        let mut kept = Vec::new();
        let mut dropped = 0_usize;
        for (id, record) in incoming {
            match ancestry.get(&id).copied().unwrap_or(Ancestry::Unknown) {
                Ancestry::Inside => kept.push(record),
                Ancestry::Unknown => {
                    self.pending.insert(id, record);
                }
                Ancestry::Outside if building || self.config.drop_unreachable_in_partial => {
                    self.excluded.insert(id);
                    dropped += 1;
                }
                Ancestry::Outside => {
                    return Err(match record.parent_id {
                        Some(parent_id) => GraphConstructionError::Unresolved {
                            id,
                            reference: parent_id,
                            kind: ReferenceKind::Parent,
                        },
                        None => {
                            let mut ids = vec![self.root_id.clone(), id];
                            ids.sort();
                            GraphConstructionError::MultipleRoots { ids }
                        }
                    });
                }
            }
        }

        if dropped > 0 {
            debug!(
                root_id = %self.root_id,
                dropped,
                "Dropped records outside the partial graph"
            );
        }
        Ok(kept)
    }

    /// Walks parent links of an unreached record through the batch.
    fn trace_ancestry(&self, id: &str, incoming: &BTreeMap<String, ExecutionRecord>) -> Ancestry {
        let mut seen = HashSet::new();
        let mut current = id;
        while seen.insert(current) {
            let Some(record) = incoming.get(current) else {
                return Ancestry::Unknown;
            };
            match record.parent_id.as_deref() {
                None => return Ancestry::Outside,
                Some(parent) if self.excluded.contains(parent) => return Ancestry::Outside,
                Some(parent) => current = parent,
            }
        }
        Ancestry::Unknown
    }

    fn resolve(&self, record: &ExecutionRecord) -> Result<Placement, GraphConstructionError> {
        if let Some(parent_id) = &record.parent_id {
            let parent = self.vertices.get(parent_id).ok_or_else(|| {
                GraphConstructionError::Unresolved {
                    id: record.id.clone(),
                    reference: parent_id.clone(),
                    kind: ReferenceKind::Parent,
                }
            })?;
            match parent.mode {
                ExecutionMode::Children if parent.lists_child(&record.plan_node_id) => {
                    return Ok(Placement::FanOutChild(parent_id.clone()));
                }
                ExecutionMode::ChildChain if record.previous_id.is_none() => {
                    return Ok(Placement::FanOutChild(parent_id.clone()));
                }
                ExecutionMode::Children
                | ExecutionMode::ChildChain
                | ExecutionMode::Child
                | ExecutionMode::Sync
                | ExecutionMode::Task => {}
            }
        }

        if let Some(previous_id) = &record.previous_id {
            if !self.vertices.contains_key(previous_id) {
                return Err(GraphConstructionError::Unresolved {
                    id: record.id.clone(),
                    reference: previous_id.clone(),
                    kind: ReferenceKind::Previous,
                });
            }
            return Ok(Placement::ChainSuccessor(previous_id.clone()));
        }

        match &record.parent_id {
            Some(parent_id) => Ok(Placement::NestedChild(parent_id.clone())),
            None => Err(GraphConstructionError::MultipleRoots {
                ids: {
                    let mut ids = vec![self.root_id.clone(), record.id.clone()];
                    ids.sort();
                    ids
                },
            }),
        }
    }

    fn attach(&mut self, record: &ExecutionRecord, placement: Placement) {
        match placement {
            Placement::FanOutChild(parent_id) | Placement::NestedChild(parent_id) => {
                push_unique(&mut self.edge_set(&parent_id).edges, &record.id);
            }
            Placement::ChainSuccessor(previous_id) => {
                push_unique(&mut self.edge_set(&previous_id).next_ids, &record.id);
                push_unique(&mut self.edge_set(&record.id).prev_ids, &previous_id);
            }
        }

        if let Some(parent_id) = &record.parent_id {
            if self.vertices.contains_key(parent_id) {
                self.edge_set(&record.id).parent_id = Some(parent_id.clone());
            }
        }
    }

    fn edge_set(&mut self, id: &str) -> &mut EdgeSet {
        self.adjacency.entry(id.to_string()).or_default()
    }
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// Builds the graph of `records` rooted at `root_id`.
///
/// With `partial` set, only `root_id` and the executions nested below it are
/// materialised; ancestors and siblings are left out. Otherwise `root_id`
/// must be the single record without parent or previous sibling.
pub fn build_graph(
    root_id: &str,
    records: &[ExecutionRecord],
    partial: bool,
) -> Result<Graph, GraphConstructionError> {
    build_graph_with_config(root_id, records, partial, &GraphConfig::default())
}

/// [`build_graph`] with explicit configuration.
pub fn build_graph_with_config(
    root_id: &str,
    records: &[ExecutionRecord],
    partial: bool,
    config: &GraphConfig,
) -> Result<Graph, GraphConstructionError> {
    let timer = SpanTimer::start("build_graph");

    let root = records
        .iter()
        .find(|r| r.id == root_id)
        .ok_or_else(|| GraphConstructionError::RootNotFound {
            root_id: root_id.to_string(),
        })?;
    if !partial && !root.is_root() {
        return Err(GraphConstructionError::NotARoot {
            id: root_id.to_string(),
        });
    }

    let graph = GraphBuilder::new(root_id, partial)
        .with_config(config.clone())
        .ingest(records)?
        .build();
    graph.ensure_resolved()?;

    debug!(
        root_id,
        partial,
        records = records.len(),
        vertices = graph.len(),
        duration_ms = timer.finish(),
        "Built execution graph"
    );
    Ok(graph)
}

/// Merges late-arriving records into an existing graph.
///
/// New children attach to already known parents, and a record whose
/// previous sibling is the current chain terminal becomes the new terminal.
/// A record whose referent has not arrived yet is kept on the returned graph
/// (see [`Graph::pending_ids`]) and placed by the extension that supplies
/// the referent; [`Graph::ensure_resolved`] reports whatever is left.
pub fn extend_graph(
    graph: &Graph,
    records: &[ExecutionRecord],
) -> Result<Graph, GraphConstructionError> {
    extend_graph_with_config(graph, records, &GraphConfig::default())
}

/// [`extend_graph`] with explicit configuration.
pub fn extend_graph_with_config(
    graph: &Graph,
    records: &[ExecutionRecord],
    config: &GraphConfig,
) -> Result<Graph, GraphConstructionError> {
    let timer = SpanTimer::start("extend_graph");
    let before = graph.len();

    let extended = GraphBuilder::from_graph(graph)
        .with_config(config.clone())
        .ingest(records)?
        .build();

    debug!(
        root_id = %extended.root_id,
        records = records.len(),
        added = extended.len() - before,
        pending = extended.pending.len(),
        duration_ms = timer.finish(),
        "Extended execution graph"
    );
    Ok(extended)
}
