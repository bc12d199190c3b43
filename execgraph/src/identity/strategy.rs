//! Identity replay of a strategy (matrix / for-each) level.

use super::decision::{IdentityDecision, NextAction};
use super::handler::{
    identity_execution_id, replay_node, Cohort, IdentityHandler, IdentityServices,
};
use super::params::IdentityStepParameters;
use crate::context::Ambiance;
use crate::core::{
    ChildExecutableResponse, ChildrenExecutableResponse, ExecutableResponse, ExecutionRecord,
    StepResponse, IDENTITY_STRATEGY,
};
use crate::errors::IdentityError;
use async_trait::async_trait;
use tracing::debug;

/// Replays a strategy level.
///
/// Iterations that finished without breaking are replayed through identity
/// nodes; broken or aborted iterations run again. Children are considered in
/// the order the store returns them.
pub struct IdentityStrategyStep {
    services: IdentityServices,
}

impl IdentityStrategyStep {
    /// Creates the handler.
    #[must_use]
    pub fn new(services: IdentityServices) -> Self {
        Self { services }
    }

    async fn iterations(
        &self,
        original: &ExecutionRecord,
    ) -> Result<Vec<ExecutionRecord>, IdentityError> {
        let children = self
            .services
            .store()
            .get_children_with_ambiance_and_node(&original.id, true, true)
            .await?;
        Ok(self.services.current_attempts(children))
    }

    /// The original waited on one iteration: wait on its clone, or on the
    /// original node if it broke.
    async fn single_iteration(
        &self,
        original: &ExecutionRecord,
        child_node_id: &str,
        execution_id: &str,
        retagged: Ambiance,
    ) -> Result<IdentityDecision, IdentityError> {
        let iterations = self.iterations(original).await?;
        let replay = iterations
            .iter()
            .rev()
            .find(|child| child.plan_node_id == child_node_id)
            .and_then(|child| replay_node(child, true));

        self.services.clone_outputs(execution_id, &original.id).await?;

        match replay {
            Some(node) => {
                self.services
                    .persist(std::slice::from_ref(&node), &retagged)
                    .await?;
                let action = NextAction::WaitChild(ChildExecutableResponse {
                    child_node_id: node.uuid().to_string(),
                });
                Ok(IdentityDecision::new(retagged, action).with_identity_nodes(vec![node]))
            }
            None => Ok(IdentityDecision::new(
                retagged,
                NextAction::WaitChild(ChildExecutableResponse {
                    child_node_id: child_node_id.to_string(),
                }),
            )),
        }
    }
}

#[async_trait]
impl IdentityHandler for IdentityStrategyStep {
    fn step_type(&self) -> &'static str {
        IDENTITY_STRATEGY
    }

    async fn obtain(
        &self,
        ambiance: &Ambiance,
        params: &IdentityStepParameters,
    ) -> Result<IdentityDecision, IdentityError> {
        let original = self.services.fetch_original(params).await?;
        let execution_id = identity_execution_id(ambiance)?;
        let retagged = ambiance.retag_for_identity();

        let decision = match original.last_executable_response() {
            None => {
                return Err(IdentityError::MissingExecutableResponse {
                    id: original.id.clone(),
                })
            }
            Some(ExecutableResponse::Sync | ExecutableResponse::Task { .. }) => {
                self.services
                    .clone_results(&execution_id, &original.id)
                    .await?;
                IdentityDecision::new(
                    retagged,
                    NextAction::Terminal(StepResponse::with_status(original.status)),
                )
            }
            Some(ExecutableResponse::Child(child)) => {
                self.single_iteration(&original, &child.child_node_id, &execution_id, retagged)
                    .await?
            }
            Some(ExecutableResponse::ChildChain(chain)) => {
                self.single_iteration(&original, &chain.next_child_id, &execution_id, retagged)
                    .await?
            }
            Some(ExecutableResponse::Children(fan_out)) => {
                let iterations = self.iterations(&original).await?;
                let cohort = Cohort::plan(&iterations, true);

                self.services
                    .clone_outputs(&execution_id, &original.id)
                    .await?;
                self.services.persist(&cohort.identity_nodes, &retagged).await?;

                debug!(
                    original_execution_id = %original.id,
                    replayed = cohort.identity_nodes.len(),
                    rerun = cohort.rerun_count(),
                    max_concurrency = fan_out.max_concurrency,
                    "Replaying strategy iterations"
                );
                IdentityDecision::new(
                    retagged,
                    NextAction::WaitChildren(ChildrenExecutableResponse {
                        children: cohort.children,
                        max_concurrency: fan_out.max_concurrency,
                    }),
                )
                .with_identity_nodes(cohort.identity_nodes)
            }
        };

        debug!(
            original_execution_id = %original.id,
            execution_id = %execution_id,
            action = decision.action.kind(),
            "Identity strategy decided"
        );
        Ok(decision)
    }
}
