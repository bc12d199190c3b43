//! Identity replay of a container nested directly inside a strategy.

use super::decision::{IdentityDecision, NextAction};
use super::handler::{
    identity_execution_id, replay_node, Cohort, IdentityHandler, IdentityServices,
};
use super::params::IdentityStepParameters;
use super::ports::{ChildOrdering, FieldProjection};
use crate::context::Ambiance;
use crate::core::{
    ChildExecutableResponse, ChildrenExecutableResponse, ExecutableResponse, ExecutionRecord,
    StepResponse, IDENTITY_STRATEGY_INTERNAL,
};
use crate::errors::IdentityError;
use async_trait::async_trait;
use tracing::debug;

/// Replays one strategy iteration.
///
/// Children are considered oldest first. When the original waited on a
/// single child (or a chain), only the earliest child is scheduled; the
/// chain advances from there on its own, one link in flight at a time.
pub struct IdentityStrategyInternalStep {
    services: IdentityServices,
}

impl IdentityStrategyInternalStep {
    /// Creates the handler.
    #[must_use]
    pub fn new(services: IdentityServices) -> Self {
        Self { services }
    }

    async fn children_oldest_first(
        &self,
        original: &ExecutionRecord,
    ) -> Result<Vec<ExecutionRecord>, IdentityError> {
        let children = self
            .services
            .store()
            .get_children(
                &original.id,
                &FieldProjection::ambiance_and_node(),
                ChildOrdering::CreatedAtAscending,
            )
            .await?;
        Ok(self.services.current_attempts(children))
    }

    async fn earliest_child(
        &self,
        original: &ExecutionRecord,
        fallback_node_id: &str,
        execution_id: &str,
        retagged: Ambiance,
    ) -> Result<IdentityDecision, IdentityError> {
        let children = self.children_oldest_first(original).await?;
        self.services.clone_outputs(execution_id, &original.id).await?;

        let Some(earliest) = children.first() else {
            return Ok(IdentityDecision::new(
                retagged,
                NextAction::WaitChild(ChildExecutableResponse {
                    child_node_id: fallback_node_id.to_string(),
                }),
            ));
        };

        match replay_node(earliest, false) {
            Some(node) => {
                self.services
                    .persist(std::slice::from_ref(&node), &retagged)
                    .await?;
                debug!(
                    original_execution_id = %original.id,
                    child_execution_id = %earliest.id,
                    skipped = children.len() - 1,
                    "Replaying earliest child"
                );
                let action = NextAction::WaitChild(ChildExecutableResponse {
                    child_node_id: node.uuid().to_string(),
                });
                Ok(IdentityDecision::new(retagged, action).with_identity_nodes(vec![node]))
            }
            None => Ok(IdentityDecision::new(
                retagged,
                NextAction::WaitChild(ChildExecutableResponse {
                    child_node_id: earliest.plan_node_id.clone(),
                }),
            )),
        }
    }
}

#[async_trait]
impl IdentityHandler for IdentityStrategyInternalStep {
    fn step_type(&self) -> &'static str {
        IDENTITY_STRATEGY_INTERNAL
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
                self.earliest_child(&original, &child.child_node_id, &execution_id, retagged)
                    .await?
            }
            Some(ExecutableResponse::ChildChain(chain)) => {
                self.earliest_child(&original, &chain.next_child_id, &execution_id, retagged)
                    .await?
            }
            Some(ExecutableResponse::Children(fan_out)) => {
                let children = self.children_oldest_first(&original).await?;
                let cohort = Cohort::plan(&children, false);

                self.services
                    .clone_outputs(&execution_id, &original.id)
                    .await?;
                self.services.persist(&cohort.identity_nodes, &retagged).await?;

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
            "Identity strategy iteration decided"
        );
        Ok(decision)
    }
}
