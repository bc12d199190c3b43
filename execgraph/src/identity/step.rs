//! Identity replay of a single step.

use super::decision::{IdentityDecision, NextAction};
use super::handler::{identity_execution_id, Cohort, IdentityHandler, IdentityServices};
use super::params::IdentityStepParameters;
use super::ports::{ChildOrdering, FieldProjection};
use crate::context::Ambiance;
use crate::core::{
    ChildExecutableResponse, ChildrenExecutableResponse, ExecutableResponse, StepResponse,
    IDENTITY_STEP,
};
use crate::errors::IdentityError;
use async_trait::async_trait;
use tracing::debug;

/// Replays a step from what it asked the engine to do the first time.
///
/// | original response | decision |
/// |---|---|
/// | `SYNC` / `TASK` | clone outputs and outcomes, finish with the original status |
/// | `CHILD` | clone outputs, wait on the same child |
/// | `CHILD_CHAIN` | clone outputs, wait on the chain's recorded next child |
/// | `CHILDREN` | clone outputs, replay final children and re-run the rest |
pub struct IdentityStep {
    services: IdentityServices,
}

impl IdentityStep {
    /// Creates the handler.
    #[must_use]
    pub fn new(services: IdentityServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl IdentityHandler for IdentityStep {
    fn step_type(&self) -> &'static str {
        IDENTITY_STEP
    }

    async fn obtain(
        &self,
        ambiance: &Ambiance,
        params: &IdentityStepParameters,
    ) -> Result<IdentityDecision, IdentityError> {
        let original = self.services.fetch_original(params).await?;
        let execution_id = identity_execution_id(ambiance)?;
        let retagged = ambiance.retag_for_identity();

        let response = original.last_executable_response().ok_or_else(|| {
            IdentityError::MissingExecutableResponse {
                id: original.id.clone(),
            }
        })?;

        let decision = match response {
            ExecutableResponse::Sync | ExecutableResponse::Task { .. } => {
                self.services
                    .clone_results(&execution_id, &original.id)
                    .await?;
                IdentityDecision::new(
                    retagged,
                    NextAction::Terminal(StepResponse::with_status(original.status)),
                )
            }
            ExecutableResponse::Child(child) => {
                self.services
                    .clone_outputs(&execution_id, &original.id)
                    .await?;
                IdentityDecision::new(retagged, NextAction::WaitChild(child.clone()))
            }
            ExecutableResponse::ChildChain(chain) => {
                self.services
                    .clone_outputs(&execution_id, &original.id)
                    .await?;
                IdentityDecision::new(
                    retagged,
                    NextAction::WaitChild(ChildExecutableResponse {
                        child_node_id: chain.next_child_id.clone(),
                    }),
                )
            }
            ExecutableResponse::Children(fan_out) => {
                let children = self
                    .services
                    .store()
                    .get_children(
                        &original.id,
                        &FieldProjection::ambiance_and_node(),
                        ChildOrdering::Unordered,
                    )
                    .await?;
                let children = self.services.current_attempts(children);
                let cohort = Cohort::plan(&children, false);

                self.services
                    .clone_outputs(&execution_id, &original.id)
                    .await?;
                self.services.persist(&cohort.identity_nodes, &retagged).await?;

                debug!(
                    original_execution_id = %original.id,
                    replayed = cohort.identity_nodes.len(),
                    rerun = cohort.rerun_count(),
                    "Replaying fan-out step"
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
            "Identity step decided"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        ChildChainExecutableResponse, ExecutionMode, Status, StepResponseNotifyData,
    };
    use crate::errors::CollaboratorError;
    use crate::identity::ports::{MockOutcomeCloner, MockOutputCloner};
    use crate::testing::{CloneKind, RecordFixture, TestServices};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn setup() -> (TestServices, RecordFixture) {
        (TestServices::new(), RecordFixture::new("plan-exec-1"))
    }

    #[tokio::test]
    async fn test_sync_original_finishes_with_same_status() {
        let (env, mut fx) = setup();
        env.store.insert(
            fx.step("orig-1", "build", ExecutionMode::Sync)
                .with_status(Status::IgnoreFailed)
                .with_executable_response(ExecutableResponse::Sync),
        );

        let step = IdentityStep::new(env.services());
        let decision = step
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("orig-1"))
            .await
            .unwrap();

        assert_eq!(
            decision.action,
            NextAction::Terminal(StepResponse::with_status(Status::IgnoreFailed))
        );
        assert_eq!(decision.ambiance.current_step_type().unwrap().type_name, IDENTITY_STEP);
        assert_eq!(
            env.cloner.calls_of(CloneKind::Outputs),
            vec![("retry-1".to_string(), "orig-1".to_string())]
        );
        assert_eq!(env.cloner.calls_of(CloneKind::Outcomes).len(), 1);
        assert!(env.plan_mutator.batches().is_empty());
    }

    #[tokio::test]
    async fn test_task_original_is_terminal() {
        let (env, mut fx) = setup();
        env.store.insert(
            fx.step("orig-1", "deploy", ExecutionMode::Task)
                .with_status(Status::Succeeded)
                .with_executable_response(ExecutableResponse::Task {
                    task_id: "task-9".to_string(),
                }),
        );

        let decision = IdentityStep::new(env.services())
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("orig-1"))
            .await
            .unwrap();
        assert!(decision.action.is_terminal());
    }

    #[tokio::test]
    async fn test_child_original_waits_on_same_child() {
        let (env, mut fx) = setup();
        env.store.insert(
            fx.step("orig-1", "group", ExecutionMode::Child)
                .with_executable_response(ExecutableResponse::Child(ChildExecutableResponse {
                    child_node_id: "child-node".to_string(),
                })),
        );

        let decision = IdentityStep::new(env.services())
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("orig-1"))
            .await
            .unwrap();

        assert_eq!(decision.action.child_node_ids(), vec!["child-node"]);
        assert_eq!(env.cloner.calls_of(CloneKind::Outputs).len(), 1);
        assert!(env.cloner.calls_of(CloneKind::Outcomes).is_empty());
    }

    #[tokio::test]
    async fn test_chain_original_waits_on_next_link() {
        let (env, mut fx) = setup();
        env.store.insert(
            fx.step("orig-1", "stages", ExecutionMode::ChildChain)
                .with_executable_response(ExecutableResponse::ChildChain(
                    ChildChainExecutableResponse {
                        next_child_id: "stage-2".to_string(),
                        previous_child_id: Some("stage-1".to_string()),
                        last_link: true,
                    },
                )),
        );

        let decision = IdentityStep::new(env.services())
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("orig-1"))
            .await
            .unwrap();
        assert_eq!(
            decision.action,
            NextAction::WaitChild(ChildExecutableResponse {
                child_node_id: "stage-2".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_children_original_replays_cohort() {
        let (env, mut fx) = setup();
        env.store.insert(
            fx.step("fork-1", "parallel", ExecutionMode::Children)
                .with_executable_response(ExecutableResponse::Children(
                    ChildrenExecutableResponse {
                        children: vec!["a".into(), "b".into(), "c".into()],
                        max_concurrency: 2,
                    },
                )),
        );
        for (id, status) in [
            ("a", Status::Succeeded),
            ("b", Status::Succeeded),
            ("c", Status::Failed),
        ] {
            env.store.insert(
                fx.step(id, id, ExecutionMode::Sync)
                    .with_parent("fork-1")
                    .with_status(status),
            );
        }

        let decision = IdentityStep::new(env.services())
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("fork-1"))
            .await
            .unwrap();

        let NextAction::WaitChildren(children) = &decision.action else {
            panic!("expected wait_children, got {}", decision.action);
        };
        assert_eq!(children.max_concurrency, 2);
        assert_eq!(children.children.len(), 3);
        assert_eq!(children.children[2], "c-node");
        assert_eq!(decision.identity_nodes.len(), 2);
        assert_eq!(env.plan_mutator.batches(), vec![2]);
        assert_eq!(env.plan_mutator.nodes().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_original_is_not_found() {
        let (env, fx) = setup();
        let err = IdentityStep::new(env.services())
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::NotFound { id: "ghost".to_string() });
    }

    #[tokio::test]
    async fn test_original_without_response() {
        let (env, mut fx) = setup();
        env.store.insert(fx.step("orig-1", "build", ExecutionMode::Sync));

        let err = IdentityStep::new(env.services())
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("orig-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MissingExecutableResponse { .. }));
    }

    #[tokio::test]
    async fn test_outcome_clone_failure_fails_decision() {
        let (env, mut fx) = setup();
        env.store.insert(
            fx.step("orig-1", "build", ExecutionMode::Sync)
                .with_status(Status::Succeeded)
                .with_executable_response(ExecutableResponse::Sync),
        );

        let mut outputs = MockOutputCloner::new();
        outputs
            .expect_clone_outputs_for_retry()
            .times(1)
            .returning(|_, _| Ok(()));
        let mut outcomes = MockOutcomeCloner::new();
        outcomes
            .expect_clone_outcomes_for_retry()
            .times(1)
            .returning(|_, _| Err(CollaboratorError::Unavailable("outcome db down".to_string())));

        let services = IdentityServices::new(
            env.store.clone(),
            Arc::new(outputs),
            Arc::new(outcomes),
            env.plan_mutator.clone(),
        );
        let err = IdentityStep::new(services)
            .obtain(&fx.step_ambiance("retry-1"), &IdentityStepParameters::new("orig-1"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            IdentityError::Clone {
                execution_id: "orig-1".to_string(),
                reason: "Collaborator unavailable: outcome db down".to_string(),
            }
        );
    }

    #[test]
    fn test_handle_child_response() {
        let (env, fx) = setup();
        let step = IdentityStep::new(env.services());
        let mut responses = HashMap::new();
        responses.insert(
            "child-exec".to_string(),
            StepResponseNotifyData::new("child-node", Status::Succeeded),
        );

        let response = step.handle_child_response(&fx.step_ambiance("retry-1"), &responses);
        assert_eq!(response, StepResponse::with_status(Status::Succeeded));
        assert_eq!(step.step_parameters_type(), "IdentityStepParameters");
    }
}
