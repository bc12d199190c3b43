//! In-memory collaborators for identity tests.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use crate::context::Ambiance;
use crate::core::{ExecutionRecord, PlanNode};
use crate::errors::CollaboratorError;
use crate::identity::{
    ChildOrdering, ExecutionRecordStore, FieldProjection, IdentityServices, OutcomeCloner,
    OutputCloner, PlanMutator,
};

/// Execution records kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    records: RwLock<Vec<ExecutionRecord>>,
    unavailable: Mutex<Option<String>>,
}

impl InMemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, replacing any record with the same id in place.
    pub fn insert(&self, record: ExecutionRecord) {
        let mut records = self.records.write();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
    }

    /// Adds several records.
    pub fn insert_all(&self, records: impl IntoIterator<Item = ExecutionRecord>) {
        for record in records {
            self.insert(record);
        }
    }

    /// Every record, in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.read().clone()
    }

    /// Makes every query fail with [`CollaboratorError::Unavailable`].
    pub fn set_unavailable(&self, reason: impl Into<String>) {
        *self.unavailable.lock() = Some(reason.into());
    }

    fn check_available(&self) -> Result<(), CollaboratorError> {
        match self.unavailable.lock().as_ref() {
            Some(reason) => Err(CollaboratorError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn children_of(&self, parent_id: &str) -> Vec<ExecutionRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExecutionRecordStore for InMemoryExecutionStore {
    async fn get_by_id(
        &self,
        id: &str,
        projection: &FieldProjection,
    ) -> Result<ExecutionRecord, CollaboratorError> {
        self.check_available()?;
        self.records
            .read()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .map(|r| projection.apply(r))
            .ok_or_else(|| CollaboratorError::not_found(id))
    }

    async fn get_children(
        &self,
        parent_id: &str,
        projection: &FieldProjection,
        ordering: ChildOrdering,
    ) -> Result<Vec<ExecutionRecord>, CollaboratorError> {
        self.check_available()?;
        let mut children = self.children_of(parent_id);
        if ordering == ChildOrdering::CreatedAtAscending {
            children.sort_by_key(|r| r.created_at);
        }
        Ok(children.into_iter().map(|r| projection.apply(r)).collect())
    }

    async fn get_children_with_ambiance_and_node(
        &self,
        parent_id: &str,
        include_ambiance: bool,
        include_node: bool,
    ) -> Result<Vec<ExecutionRecord>, CollaboratorError> {
        let projection = FieldProjection {
            ambiance: include_ambiance,
            node: include_node,
            executable_responses: false,
        };
        self.get_children(parent_id, &projection, ChildOrdering::Unordered)
            .await
    }
}

/// Which results a clone call copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloneKind {
    /// Step outputs.
    Outputs,
    /// Step outcomes.
    Outcomes,
}

/// One recorded clone call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneCall {
    /// What was cloned.
    pub kind: CloneKind,
    /// The identity execution receiving the copy.
    pub new_execution_id: String,
    /// The execution copied from.
    pub original_execution_id: String,
}

/// Output and outcome cloner that records every successful call.
#[derive(Debug, Default)]
pub struct RecordingCloner {
    calls: Mutex<Vec<CloneCall>>,
    failures: Mutex<Vec<(CloneKind, String)>>,
}

impl RecordingCloner {
    /// Creates a cloner that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call of `kind` fail with `reason`.
    pub fn fail_on(&self, kind: CloneKind, reason: impl Into<String>) {
        self.failures.lock().push((kind, reason.into()));
    }

    /// All successful calls.
    #[must_use]
    pub fn calls(&self) -> Vec<CloneCall> {
        self.calls.lock().clone()
    }

    /// `(new, original)` execution ids of the successful calls of `kind`.
    #[must_use]
    pub fn calls_of(&self, kind: CloneKind) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.kind == kind)
            .map(|call| (call.new_execution_id.clone(), call.original_execution_id.clone()))
            .collect()
    }

    fn record(
        &self,
        kind: CloneKind,
        new_execution_id: &str,
        original_execution_id: &str,
    ) -> Result<(), CollaboratorError> {
        if let Some((_, reason)) = self.failures.lock().iter().find(|(k, _)| *k == kind) {
            return Err(CollaboratorError::Unavailable(reason.clone()));
        }
        self.calls.lock().push(CloneCall {
            kind,
            new_execution_id: new_execution_id.to_string(),
            original_execution_id: original_execution_id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl OutputCloner for RecordingCloner {
    async fn clone_outputs_for_retry(
        &self,
        new_execution_id: &str,
        original_execution_id: &str,
    ) -> Result<(), CollaboratorError> {
        self.record(CloneKind::Outputs, new_execution_id, original_execution_id)
    }
}

#[async_trait]
impl OutcomeCloner for RecordingCloner {
    async fn clone_outcomes_for_retry(
        &self,
        new_execution_id: &str,
        original_execution_id: &str,
    ) -> Result<(), CollaboratorError> {
        self.record(CloneKind::Outcomes, new_execution_id, original_execution_id)
    }
}

/// Plan mutator that commits whole batches or nothing.
///
/// A batch is rejected if it contains a standard node or a uuid that is
/// already committed (or repeated within the batch).
#[derive(Debug, Default)]
pub struct InMemoryPlanMutator {
    nodes: RwLock<Vec<(String, PlanNode)>>,
    batches: Mutex<Vec<usize>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryPlanMutator {
    /// Creates an empty mutator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every batch fail with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    /// Committed nodes, in commit order.
    #[must_use]
    pub fn nodes(&self) -> Vec<PlanNode> {
        self.nodes.read().iter().map(|(_, n)| n.clone()).collect()
    }

    /// Committed nodes of one pipeline run.
    #[must_use]
    pub fn nodes_for(&self, plan_execution_id: &str) -> Vec<PlanNode> {
        self.nodes
            .read()
            .iter()
            .filter(|(run, _)| run == plan_execution_id)
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Looks up a committed node.
    #[must_use]
    pub fn node(&self, uuid: &str) -> Option<PlanNode> {
        self.nodes
            .read()
            .iter()
            .find(|(_, n)| n.uuid() == uuid)
            .map(|(_, n)| n.clone())
    }

    /// Sizes of the committed batches.
    #[must_use]
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().clone()
    }

    fn validate(&self, batch: &[PlanNode]) -> Result<(), CollaboratorError> {
        let committed = self.nodes.read();
        for (i, node) in batch.iter().enumerate() {
            if !node.is_identity() {
                return Err(CollaboratorError::Rejected(format!(
                    "'{}' is not an identity node",
                    node.uuid()
                )));
            }
            let repeated = batch[..i].iter().any(|n| n.uuid() == node.uuid())
                || committed.iter().any(|(_, n)| n.uuid() == node.uuid());
            if repeated {
                return Err(CollaboratorError::Rejected(format!(
                    "duplicate plan node '{}'",
                    node.uuid()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PlanMutator for InMemoryPlanMutator {
    async fn persist_identity_nodes(
        &self,
        nodes: &[PlanNode],
        ambiance: &Ambiance,
    ) -> Result<(), CollaboratorError> {
        if let Some(reason) = self.failure.lock().as_ref() {
            return Err(CollaboratorError::Unavailable(reason.clone()));
        }
        self.validate(nodes)?;

        let run = ambiance.plan_execution_id.clone();
        self.nodes
            .write()
            .extend(nodes.iter().map(|n| (run.clone(), n.clone())));
        self.batches.lock().push(nodes.len());
        Ok(())
    }
}

/// The three in-memory collaborators, shared with the services under test.
#[derive(Debug, Clone, Default)]
pub struct TestServices {
    /// Record store.
    pub store: Arc<InMemoryExecutionStore>,
    /// Output and outcome cloner.
    pub cloner: Arc<RecordingCloner>,
    /// Plan mutator.
    pub plan_mutator: Arc<InMemoryPlanMutator>,
}

impl TestServices {
    /// Creates empty collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity services backed by these collaborators.
    #[must_use]
    pub fn services(&self) -> IdentityServices {
        IdentityServices::new(
            self.store.clone(),
            self.cloner.clone(),
            self.cloner.clone(),
            self.plan_mutator.clone(),
        )
    }
}
