//! Shared plumbing for the identity step handlers.

use super::decision::IdentityDecision;
use super::params::{IdentityStepParameters, IDENTITY_STEP_PARAMETERS};
use super::ports::{
    ExecutionRecordStore, FieldProjection, OutcomeCloner, OutputCloner, PlanMutator,
};
use crate::config::IdentityConfig;
use crate::context::Ambiance;
use crate::core::{ExecutionRecord, PlanNode, StepResponse, StepResponseNotifyData};
use crate::errors::{CollaboratorError, IdentityError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Step-handler contract the engine drives identity executions through.
///
/// The engine calls `obtain` once per identity execution and then, when the
/// children it asked for finish, one of the `handle_*_response` methods.
#[async_trait]
pub trait IdentityHandler: Send + Sync {
    /// The identity step type this handler is registered under.
    fn step_type(&self) -> &'static str;

    /// Name of the parameter schema.
    fn step_parameters_type(&self) -> &'static str {
        IDENTITY_STEP_PARAMETERS
    }

    /// Decides how to replay the original execution.
    async fn obtain(
        &self,
        ambiance: &Ambiance,
        params: &IdentityStepParameters,
    ) -> Result<IdentityDecision, IdentityError>;

    /// Child-contract entry point.
    async fn obtain_child(
        &self,
        ambiance: &Ambiance,
        params: &IdentityStepParameters,
    ) -> Result<IdentityDecision, IdentityError> {
        self.obtain(ambiance, params).await
    }

    /// Children-contract entry point.
    async fn obtain_children(
        &self,
        ambiance: &Ambiance,
        params: &IdentityStepParameters,
    ) -> Result<IdentityDecision, IdentityError> {
        self.obtain(ambiance, params).await
    }

    /// Folds the single child's result into this execution's response.
    fn handle_child_response(
        &self,
        _ambiance: &Ambiance,
        responses: &HashMap<String, StepResponseNotifyData>,
    ) -> StepResponse {
        StepResponse::from_children(responses)
    }

    /// Folds all children's results into this execution's response.
    fn handle_children_response(
        &self,
        _ambiance: &Ambiance,
        responses: &HashMap<String, StepResponseNotifyData>,
    ) -> StepResponse {
        StepResponse::from_children(responses)
    }
}

/// The collaborators and settings every identity handler uses.
#[derive(Clone)]
pub struct IdentityServices {
    store: Arc<dyn ExecutionRecordStore>,
    output_cloner: Arc<dyn OutputCloner>,
    outcome_cloner: Arc<dyn OutcomeCloner>,
    plan_mutator: Arc<dyn PlanMutator>,
    config: IdentityConfig,
}

impl IdentityServices {
    /// Bundles the collaborators with default settings.
    #[must_use]
    pub fn new(
        store: Arc<dyn ExecutionRecordStore>,
        output_cloner: Arc<dyn OutputCloner>,
        outcome_cloner: Arc<dyn OutcomeCloner>,
        plan_mutator: Arc<dyn PlanMutator>,
    ) -> Self {
        Self {
            store,
            output_cloner,
            outcome_cloner,
            plan_mutator,
            config: IdentityConfig::default(),
        }
    }

    /// Sets the identity settings.
    #[must_use]
    pub fn with_config(mut self, config: IdentityConfig) -> Self {
        self.config = config;
        self
    }

    /// The identity settings.
    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn ExecutionRecordStore {
        self.store.as_ref()
    }

    /// Loads the original execution with the fields a decision needs.
    pub(crate) async fn fetch_original(
        &self,
        params: &IdentityStepParameters,
    ) -> Result<ExecutionRecord, IdentityError> {
        Ok(self
            .store
            .get_by_id(
                &params.original_node_execution_id,
                &FieldProjection::for_decision(),
            )
            .await?)
    }

    /// Drops superseded retries when configured to.
    pub(crate) fn current_attempts(&self, children: Vec<ExecutionRecord>) -> Vec<ExecutionRecord> {
        if !self.config.skip_old_retries {
            return children;
        }
        let before = children.len();
        let current: Vec<_> = children.into_iter().filter(|c| !c.old_retry).collect();
        if current.len() != before {
            debug!(skipped = before - current.len(), "Ignoring superseded retries");
        }
        current
    }

    pub(crate) async fn clone_outputs(
        &self,
        new_execution_id: &str,
        original_execution_id: &str,
    ) -> Result<(), IdentityError> {
        self.output_cloner
            .clone_outputs_for_retry(new_execution_id, original_execution_id)
            .await
            .map_err(|e| clone_error(original_execution_id, &e))
    }

    /// Clones outputs and outcomes concurrently.
    pub(crate) async fn clone_results(
        &self,
        new_execution_id: &str,
        original_execution_id: &str,
    ) -> Result<(), IdentityError> {
        let outputs = self
            .output_cloner
            .clone_outputs_for_retry(new_execution_id, original_execution_id);
        let outcomes = self
            .outcome_cloner
            .clone_outcomes_for_retry(new_execution_id, original_execution_id);
        futures::try_join!(outputs, outcomes)
            .map(|_| ())
            .map_err(|e| clone_error(original_execution_id, &e))
    }

    /// Persists the cohort in one call; an empty cohort is not sent.
    pub(crate) async fn persist(
        &self,
        nodes: &[PlanNode],
        ambiance: &Ambiance,
    ) -> Result<(), IdentityError> {
        if nodes.is_empty() {
            return Ok(());
        }
        self.plan_mutator
            .persist_identity_nodes(nodes, ambiance)
            .await
            .map_err(|e| {
                warn!(count = nodes.len(), error = %e, "Identity node batch rejected");
                IdentityError::Persist {
                    count: nodes.len(),
                    reason: e.to_string(),
                }
            })
    }
}

fn clone_error(original_execution_id: &str, err: &CollaboratorError) -> IdentityError {
    warn!(original_execution_id, error = %err, "Cloning results for retry failed");
    IdentityError::Clone {
        execution_id: original_execution_id.to_string(),
        reason: err.to_string(),
    }
}

/// Id of the identity execution itself: the innermost ambiance level.
pub(crate) fn identity_execution_id(ambiance: &Ambiance) -> Result<String, IdentityError> {
    ambiance
        .current_runtime_id()
        .map(str::to_string)
        .ok_or_else(|| IdentityError::InvalidParameters("ambiance has no levels".to_string()))
}

/// The children an identity execution waits on, split by replay strategy.
#[derive(Debug, Default)]
pub(crate) struct Cohort {
    /// Identity nodes for children that reached a final, non-broken status.
    pub(crate) identity_nodes: Vec<PlanNode>,
    /// Plan node ids to wait on, in child order: identity node ids for
    /// replayed children, original node ids for children to run again.
    pub(crate) children: Vec<String>,
}

impl Cohort {
    /// Splits `children` into replayed and re-run members.
    ///
    /// Children that broke or were aborted are never replayed.
    pub(crate) fn plan<'a, I>(children: I, parent_is_strategy: bool) -> Self
    where
        I: IntoIterator<Item = &'a ExecutionRecord>,
    {
        let mut cohort = Self::default();
        for child in children {
            match replay_node(child, parent_is_strategy) {
                Some(node) => {
                    cohort.children.push(node.uuid().to_string());
                    cohort.identity_nodes.push(node);
                }
                None => cohort.children.push(child.plan_node_id.clone()),
            }
        }
        cohort
    }

    /// Number of children that will really run.
    pub(crate) fn rerun_count(&self) -> usize {
        self.children.len() - self.identity_nodes.len()
    }
}

/// The identity node replaying `child`, or `None` if it must run again.
pub(crate) fn replay_node(child: &ExecutionRecord, parent_is_strategy: bool) -> Option<PlanNode> {
    if child.status.is_broke_or_aborted() {
        return None;
    }
    match &child.node {
        Some(node) => Some(PlanNode::identity_for(node, &child.id, parent_is_strategy)),
        None => {
            warn!(
                execution_id = %child.id,
                "Child returned without its plan node; it will run again"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecutionMode, Status, StepCategory, StepType, IDENTITY_STRATEGY_INTERNAL};

    fn child(id: &str, status: Status) -> ExecutionRecord {
        ExecutionRecord::new(id, format!("{id}-node"), ExecutionMode::Sync)
            .with_node(PlanNode::standard(
                format!("{id}-node"),
                id,
                StepType::new("ShellScript", StepCategory::Step),
            ))
            .with_status(status)
    }

    #[test]
    fn test_cohort_replays_only_final_children() {
        let children = vec![
            child("a", Status::Succeeded),
            child("b", Status::Succeeded),
            child("c", Status::Failed),
            child("d", Status::Aborted),
        ];
        let cohort = Cohort::plan(&children, true);

        assert_eq!(cohort.identity_nodes.len(), 2);
        assert_eq!(cohort.children.len(), 4);
        assert_eq!(cohort.rerun_count(), 2);
        assert_eq!(cohort.children[0], cohort.identity_nodes[0].uuid());
        assert_eq!(cohort.children[2], "c-node");
        assert_eq!(cohort.children[3], "d-node");
        assert_eq!(cohort.identity_nodes[1].original_execution_id(), Some("b"));
        assert_eq!(
            cohort.identity_nodes[0].step_type().type_name,
            IDENTITY_STRATEGY_INTERNAL
        );
    }

    #[test]
    fn test_child_without_node_runs_again() {
        let mut bare = child("a", Status::Succeeded);
        bare.node = None;
        assert!(replay_node(&bare, false).is_none());
        assert!(replay_node(&child("b", Status::Expired), false).is_none());
        assert!(replay_node(&child("c", Status::IgnoreFailed), false).is_some());
    }

    #[test]
    fn test_identity_execution_id() {
        assert!(matches!(
            identity_execution_id(&Ambiance::new("plan-exec-1")),
            Err(IdentityError::InvalidParameters(_))
        ));
    }
}
