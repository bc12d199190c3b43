//! Collaborators the identity steps depend on.
//!
//! All of them are owned by the surrounding engine; this crate only consumes
//! them through these traits.

use crate::context::Ambiance;
use crate::core::{ExecutionRecord, PlanNode};
use crate::errors::CollaboratorError;
use async_trait::async_trait;

/// Which optional record fields a store query should populate.
///
/// Fields left out come back empty (`None` / empty vec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldProjection {
    /// Populate `ambiance`.
    pub ambiance: bool,
    /// Populate `node`.
    pub node: bool,
    /// Populate `executable_responses`.
    pub executable_responses: bool,
}

impl FieldProjection {
    /// Every field.
    #[must_use]
    pub fn all() -> Self {
        Self {
            ambiance: true,
            node: true,
            executable_responses: true,
        }
    }

    /// What an identity decision needs from the original execution.
    #[must_use]
    pub fn for_decision() -> Self {
        Self {
            ambiance: false,
            node: true,
            executable_responses: true,
        }
    }

    /// Ambiance and plan node only.
    #[must_use]
    pub fn ambiance_and_node() -> Self {
        Self {
            ambiance: true,
            node: true,
            executable_responses: false,
        }
    }

    /// Clears the fields this projection leaves out.
    #[must_use]
    pub fn apply(&self, mut record: ExecutionRecord) -> ExecutionRecord {
        if !self.ambiance {
            record.ambiance = None;
        }
        if !self.node {
            record.node = None;
        }
        if !self.executable_responses {
            record.executable_responses.clear();
        }
        record
    }
}

/// Order of children returned by [`ExecutionRecordStore::get_children`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildOrdering {
    /// Whatever order the store finds cheapest.
    #[default]
    Unordered,
    /// Oldest first.
    CreatedAtAscending,
}

/// Read access to execution records.
#[async_trait]
pub trait ExecutionRecordStore: Send + Sync {
    /// Fetches one record.
    async fn get_by_id(
        &self,
        id: &str,
        projection: &FieldProjection,
    ) -> Result<ExecutionRecord, CollaboratorError>;

    /// Fetches the records whose `parent_id` is `parent_id`.
    async fn get_children(
        &self,
        parent_id: &str,
        projection: &FieldProjection,
        ordering: ChildOrdering,
    ) -> Result<Vec<ExecutionRecord>, CollaboratorError>;

    /// Fetches children with only ambiance and/or plan node populated.
    async fn get_children_with_ambiance_and_node(
        &self,
        parent_id: &str,
        include_ambiance: bool,
        include_node: bool,
    ) -> Result<Vec<ExecutionRecord>, CollaboratorError>;
}

/// Copies step outputs from an original execution to its identity clone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutputCloner: Send + Sync {
    /// Clones outputs of `original_execution_id` under `new_execution_id`.
    async fn clone_outputs_for_retry(
        &self,
        new_execution_id: &str,
        original_execution_id: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Copies step outcomes from an original execution to its identity clone.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OutcomeCloner: Send + Sync {
    /// Clones outcomes of `original_execution_id` under `new_execution_id`.
    async fn clone_outcomes_for_retry(
        &self,
        new_execution_id: &str,
        original_execution_id: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Registers synthesised plan nodes with the running plan.
#[async_trait]
pub trait PlanMutator: Send + Sync {
    /// Persists the whole batch or nothing.
    async fn persist_identity_nodes(
        &self,
        nodes: &[PlanNode],
        ambiance: &Ambiance,
    ) -> Result<(), CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecutableResponse, ExecutionMode, StepCategory, StepType};

    #[test]
    fn test_projection_clears_unrequested_fields() {
        let record = ExecutionRecord::new("exec-1", "node-1", ExecutionMode::Sync)
            .with_node(PlanNode::standard(
                "node-1",
                "build",
                StepType::new("ShellScript", StepCategory::Step),
            ))
            .with_ambiance(Ambiance::new("plan-exec-1"))
            .with_executable_response(ExecutableResponse::Sync);

        let projected = FieldProjection::ambiance_and_node().apply(record.clone());
        assert!(projected.ambiance.is_some());
        assert!(projected.node.is_some());
        assert!(projected.executable_responses.is_empty());

        let projected = FieldProjection::default().apply(record.clone());
        assert!(projected.ambiance.is_none());
        assert!(projected.node.is_none());

        assert_eq!(FieldProjection::all().apply(record.clone()), record);
    }
}
