//! The graph value handed to the visualisation layer.

use crate::core::{ExecutionMode, ExecutionRecord, SkipType, Status, StepType};
use crate::errors::{GraphConstructionError, ReferenceKind};
use crate::utils::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Display data for one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexView {
    /// Execution id.
    pub id: String,
    /// Plan node the execution ran.
    pub plan_node_id: String,
    /// Display name.
    pub name: String,
    /// Authored step type, when the plan node was projected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<StepType>,
    /// Static skip classification.
    pub skip_type: SkipType,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Current status.
    pub status: Status,
    /// Fan-out children listed in the resolved parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_node_ids: Vec<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl VertexView {
    /// Creates the vertex for a record.
    #[must_use]
    pub fn from_record(record: &ExecutionRecord) -> Self {
        let node = record.node.as_ref();
        Self {
            id: record.id.clone(),
            plan_node_id: record.plan_node_id.clone(),
            name: node.map_or_else(|| record.plan_node_id.clone(), |n| n.name().to_string()),
            step_type: node.map(|n| n.original_step_type().clone()),
            skip_type: node.map_or(SkipType::DoNotSkip, crate::core::PlanNode::skip_type),
            mode: record.mode,
            status: record.status,
            child_node_ids: record.resolved_parameters.child_node_ids.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// Returns true if `plan_node_id` is one of this vertex's fan-out children.
    #[must_use]
    pub fn lists_child(&self, plan_node_id: &str) -> bool {
        self.child_node_ids.iter().any(|id| id == plan_node_id)
    }
}

/// Outgoing pointers of one vertex.
///
/// `edges` is structural containment (fan-out children, chain head, nested
/// child); `next_ids`/`prev_ids` are temporal sequence at the same level.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeSet {
    /// Direct children.
    #[serde(default)]
    pub edges: Vec<String>,
    /// Chain successors.
    #[serde(default)]
    pub next_ids: Vec<String>,
    /// Chain predecessors.
    #[serde(default)]
    pub prev_ids: Vec<String>,
    /// Enclosing execution, when it is part of the graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// An execution graph: vertices plus adjacency, keyed by execution id.
///
/// Every vertex has an adjacency entry, possibly empty. Records whose parent
/// or previous sibling has not arrived yet are held back, not placed, until
/// a later extension supplies the referent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub(crate) root_id: String,
    pub(crate) partial: bool,
    pub(crate) vertices: BTreeMap<String, VertexView>,
    pub(crate) adjacency: BTreeMap<String, EdgeSet>,
    #[serde(skip)]
    pub(crate) pending: BTreeMap<String, ExecutionRecord>,
    /// Ids known to lie outside a partial graph.
    #[serde(skip)]
    pub(crate) excluded: BTreeSet<String>,
}

impl Graph {
    /// The id the graph was built from.
    #[must_use]
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Returns true if the graph is rooted mid-execution.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// All vertices.
    #[must_use]
    pub fn vertices(&self) -> &BTreeMap<String, VertexView> {
        &self.vertices
    }

    /// All adjacency entries.
    #[must_use]
    pub fn adjacency(&self) -> &BTreeMap<String, EdgeSet> {
        &self.adjacency
    }

    /// Looks up a vertex.
    #[must_use]
    pub fn vertex(&self, id: &str) -> Option<&VertexView> {
        self.vertices.get(id)
    }

    /// Looks up an adjacency entry.
    #[must_use]
    pub fn edge_set(&self, id: &str) -> Option<&EdgeSet> {
        self.adjacency.get(id)
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Returns true if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Ids of records held back until their referent arrives.
    pub fn pending_ids(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    /// Returns true if some records are still waiting for a referent.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Fails with [`GraphConstructionError::Unresolved`] if any record is
    /// still waiting for a referent.
    ///
    /// The reported record is one whose referent is missing altogether, not
    /// merely held back itself.
    pub fn ensure_resolved(&self) -> Result<(), GraphConstructionError> {
        let mut first = None;
        for record in self.pending.values() {
            let references = [
                (record.parent_id.as_ref(), ReferenceKind::Parent),
                (record.previous_id.as_ref(), ReferenceKind::Previous),
            ];
            for (reference, kind) in references {
                let Some(reference) = reference.filter(|r| !self.vertices.contains_key(*r)) else {
                    continue;
                };
                let error = GraphConstructionError::Unresolved {
                    id: record.id.clone(),
                    reference: reference.clone(),
                    kind,
                };
                if !self.pending.contains_key(reference) {
                    return Err(error);
                }
                first.get_or_insert(error);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Follows `next_ids` from `id` to the last link of its chain.
    ///
    /// Only the first successor of each link is followed.
    #[must_use]
    pub fn chain_terminal(&self, id: &str) -> Option<&str> {
        let mut current = self.vertices.get_key_value(id)?.0.as_str();
        let mut seen = BTreeSet::new();
        while seen.insert(current) {
            let next_ids = self.adjacency.get(current).map(|e| e.next_ids.as_slice());
            match next_ids {
                Some([next, rest @ ..]) => {
                    if !rest.is_empty() {
                        debug!(
                            id = current,
                            successors = rest.len() + 1,
                            "Chain link has several successors, following the first"
                        );
                    }
                    current = next.as_str();
                }
                _ => break,
            }
        }
        Some(current)
    }

    /// Ids of `id` and every vertex nested below it, at any depth.
    #[must_use]
    pub fn downstream_closure(&self, id: &str) -> BTreeSet<String> {
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (child, edge_set) in &self.adjacency {
            if let Some(parent) = &edge_set.parent_id {
                children.entry(parent.as_str()).or_default().push(child.as_str());
            }
            for nested in &edge_set.edges {
                children.entry(child.as_str()).or_default().push(nested.as_str());
            }
        }

        let mut closure = BTreeSet::new();
        if !self.vertices.contains_key(id) {
            return closure;
        }
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !closure.insert(current.to_string()) {
                continue;
            }
            if let Some(next) = children.get(current) {
                queue.extend(next.iter().copied());
            }
        }
        closure
    }
}
