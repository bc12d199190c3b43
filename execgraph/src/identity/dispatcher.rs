//! Routes identity executions to their handler.

use super::decision::{IdentityDecision, NextAction};
use super::handler::{IdentityHandler, IdentityServices};
use super::params::IdentityStepParameters;
use super::step::IdentityStep;
use super::strategy::IdentityStrategyStep;
use super::strategy_internal::IdentityStrategyInternalStep;
use crate::context::Ambiance;
use crate::core::{StepResponse, StepResponseNotifyData};
use crate::errors::IdentityError;
use crate::events::{EventSink, NoOpEventSink, IDENTITY_DECIDED, IDENTITY_FAILED};
use crate::observability::SpanTimer;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point the engine calls for every identity execution.
///
/// The handler is picked from the identity step type at the innermost
/// ambiance level (the ambiance is retagged first, so an untagged ambiance
/// routes the same way). Decision errors never escape: they become a failed
/// terminal response, so the retry falls back to running the step for real.
pub struct IdentityDispatcher {
    handlers: HashMap<&'static str, Arc<dyn IdentityHandler>>,
    sink: Arc<dyn EventSink>,
    emit_events: bool,
}

impl IdentityDispatcher {
    /// Creates a dispatcher with the three identity handlers registered.
    #[must_use]
    pub fn new(services: IdentityServices) -> Self {
        let emit_events = services.config().emit_events;
        let mut dispatcher = Self {
            handlers: HashMap::new(),
            sink: Arc::new(NoOpEventSink),
            emit_events,
        };
        dispatcher.register(Arc::new(IdentityStep::new(services.clone())));
        dispatcher.register(Arc::new(IdentityStrategyStep::new(services.clone())));
        dispatcher.register(Arc::new(IdentityStrategyInternalStep::new(services)));
        dispatcher
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registers a handler, replacing any handler for the same step type.
    pub fn register(&mut self, handler: Arc<dyn IdentityHandler>) {
        self.handlers.insert(handler.step_type(), handler);
    }

    /// Registered step types, sorted.
    #[must_use]
    pub fn step_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Returns the handler for the ambiance's innermost level.
    pub fn handler_for(
        &self,
        ambiance: &Ambiance,
    ) -> Result<&Arc<dyn IdentityHandler>, IdentityError> {
        let retagged = ambiance.retag_for_identity();
        let step_type = retagged.current_step_type().ok_or_else(|| {
            IdentityError::InvalidParameters("ambiance has no levels".to_string())
        })?;
        self.handlers.get(step_type.type_name.as_str()).ok_or_else(|| {
            IdentityError::InvalidParameters(format!(
                "no identity handler for step type '{step_type}'"
            ))
        })
    }

    /// Decides the next action for an identity execution.
    pub async fn obtain(
        &self,
        ambiance: &Ambiance,
        params: &serde_json::Value,
    ) -> IdentityDecision {
        let timer = SpanTimer::start("identity.obtain");
        let execution_id = ambiance.current_runtime_id().unwrap_or_default().to_string();

        match self.try_obtain(ambiance, params).await {
            Ok((original_execution_id, decision)) => {
                let duration_ms = timer.finish();
                info!(
                    execution_id = %execution_id,
                    original_execution_id = %original_execution_id,
                    action = %decision.action,
                    identity_nodes = decision.identity_nodes.len(),
                    duration_ms,
                    "Identity decision"
                );
                self.emit(
                    IDENTITY_DECIDED,
                    json!({
                        "execution_id": execution_id,
                        "original_execution_id": original_execution_id,
                        "action": decision.action.kind(),
                        "children": decision.action.child_node_ids(),
                        "identity_nodes": decision.identity_nodes.len(),
                        "duration_ms": duration_ms,
                    }),
                )
                .await;
                decision
            }
            Err(err) => {
                warn!(execution_id = %execution_id, error = %err, "Identity decision failed");
                self.emit(
                    IDENTITY_FAILED,
                    json!({
                        "execution_id": execution_id,
                        "error": err.to_string(),
                    }),
                )
                .await;
                IdentityDecision::new(
                    ambiance.retag_for_identity(),
                    NextAction::Terminal(StepResponse::failed(err.to_string())),
                )
            }
        }
    }

    /// Folds the results of the children an identity execution waited on.
    #[must_use]
    pub fn handle_children_response(
        &self,
        ambiance: &Ambiance,
        responses: &HashMap<String, StepResponseNotifyData>,
    ) -> StepResponse {
        match self.handler_for(ambiance) {
            Ok(handler) if responses.len() == 1 => {
                handler.handle_child_response(ambiance, responses)
            }
            Ok(handler) => handler.handle_children_response(ambiance, responses),
            Err(_) => StepResponse::from_children(responses),
        }
    }

    async fn try_obtain(
        &self,
        ambiance: &Ambiance,
        params: &serde_json::Value,
    ) -> Result<(String, IdentityDecision), IdentityError> {
        let params = IdentityStepParameters::from_value(params)?;
        let handler = self.handler_for(ambiance)?;
        let decision = handler.obtain(ambiance, &params).await?;
        Ok((params.original_node_execution_id, decision))
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.emit_events {
            self.sink.emit(event_type, Some(data)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentityConfig;
    use crate::core::{
        ExecutableResponse, ExecutionMode, Status, IDENTITY_STEP, IDENTITY_STRATEGY,
        IDENTITY_STRATEGY_INTERNAL,
    };
    use crate::events::CollectingEventSink;
    use crate::testing::{CloneKind, RecordFixture, TestServices};

    #[test]
    fn test_registers_all_identity_types() {
        let dispatcher = IdentityDispatcher::new(TestServices::new().services());
        assert_eq!(
            dispatcher.step_types(),
            vec![IDENTITY_STEP, IDENTITY_STRATEGY, IDENTITY_STRATEGY_INTERNAL]
        );
    }

    #[test]
    fn test_routes_by_innermost_level() {
        let dispatcher = IdentityDispatcher::new(TestServices::new().services());
        let fx = RecordFixture::new("plan-exec-1");

        let routed = |ambiance: &Ambiance| dispatcher.handler_for(ambiance).unwrap().step_type();
        assert_eq!(routed(&fx.step_ambiance("x")), IDENTITY_STEP);
        assert_eq!(routed(&fx.strategy_ambiance("x")), IDENTITY_STRATEGY);
        assert_eq!(routed(&fx.iteration_ambiance("x")), IDENTITY_STRATEGY_INTERNAL);
        assert!(dispatcher.handler_for(&Ambiance::new("plan-exec-1")).is_err());
    }

    #[tokio::test]
    async fn test_success_emits_decided() {
        let env = TestServices::new();
        let mut fx = RecordFixture::new("plan-exec-1");
        env.store.insert(
            fx.step("orig-1", "build", ExecutionMode::Sync)
                .with_status(Status::Succeeded)
                .with_executable_response(ExecutableResponse::Sync),
        );
        let sink = Arc::new(CollectingEventSink::new());
        let dispatcher = IdentityDispatcher::new(env.services()).with_event_sink(sink.clone());

        let decision = dispatcher
            .obtain(
                &fx.step_ambiance("retry-1"),
                &IdentityStepParameters::new("orig-1").to_value(),
            )
            .await;

        assert_eq!(
            decision.action,
            NextAction::Terminal(StepResponse::with_status(Status::Succeeded))
        );
        let events = sink.events_of_type(IDENTITY_DECIDED);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].field("original_execution_id"), Some("orig-1"));
        assert_eq!(events[0].field("action"), Some("terminal"));
    }

    #[tokio::test]
    async fn test_clone_failure_becomes_step_failure() {
        let env = TestServices::new();
        env.cloner.fail_on(CloneKind::Outputs, "blob store offline");
        let mut fx = RecordFixture::new("plan-exec-1");
        env.store.insert(
            fx.step("orig-1", "build", ExecutionMode::Sync)
                .with_status(Status::Succeeded)
                .with_executable_response(ExecutableResponse::Sync),
        );
        let sink = Arc::new(CollectingEventSink::new());
        let dispatcher = IdentityDispatcher::new(env.services()).with_event_sink(sink.clone());

        let decision = dispatcher
            .obtain(
                &fx.step_ambiance("retry-1"),
                &IdentityStepParameters::new("orig-1").to_value(),
            )
            .await;

        let NextAction::Terminal(response) = decision.action else {
            panic!("expected a terminal failure");
        };
        assert_eq!(response.status, Status::Failed);
        assert!(response.failure.unwrap().messages[0].contains("blob store offline"));
        assert_eq!(sink.events_of_type(IDENTITY_FAILED).len(), 1);
        assert!(sink.events_of_type(IDENTITY_DECIDED).is_empty());
    }

    #[tokio::test]
    async fn test_missing_original_becomes_step_failure() {
        let env = TestServices::new();
        let fx = RecordFixture::new("plan-exec-1");
        let dispatcher = IdentityDispatcher::new(env.services());

        let decision = dispatcher
            .obtain(
                &fx.step_ambiance("retry-1"),
                &IdentityStepParameters::new("ghost").to_value(),
            )
            .await;

        match decision.action {
            NextAction::Terminal(response) => {
                assert_eq!(response.status, Status::Failed);
                assert_eq!(
                    response.failure.unwrap().messages,
                    vec!["Original execution not found: ghost".to_string()]
                );
            }
            other => panic!("expected terminal, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_bad_parameters_become_step_failure() {
        let env = TestServices::new();
        let fx = RecordFixture::new("plan-exec-1");
        let decision = IdentityDispatcher::new(env.services())
            .obtain(&fx.step_ambiance("retry-1"), &serde_json::json!({"nope": 1}))
            .await;
        assert!(decision.action.is_terminal());
    }

    #[tokio::test]
    async fn test_events_can_be_disabled() {
        let env = TestServices::new();
        let fx = RecordFixture::new("plan-exec-1");
        let sink = Arc::new(CollectingEventSink::new());
        let services = env
            .services()
            .with_config(IdentityConfig::default().with_emit_events(false));
        let dispatcher = IdentityDispatcher::new(services).with_event_sink(sink.clone());

        dispatcher
            .obtain(
                &fx.step_ambiance("retry-1"),
                &IdentityStepParameters::new("ghost").to_value(),
            )
            .await;
        assert!(sink.is_empty());
    }

    #[test]
    fn test_handle_children_response_aggregates() {
        let dispatcher = IdentityDispatcher::new(TestServices::new().services());
        let fx = RecordFixture::new("plan-exec-1");
        let mut responses = HashMap::new();
        responses.insert(
            "a".to_string(),
            StepResponseNotifyData::new("a-node", Status::Succeeded),
        );
        responses.insert(
            "b".to_string(),
            StepResponseNotifyData::new("b-node", Status::Aborted).with_failure("cancelled"),
        );

        let response = dispatcher.handle_children_response(&fx.strategy_ambiance("m"), &responses);
        assert_eq!(response.status, Status::Aborted);
        assert_eq!(response.failure.unwrap().messages, vec!["cancelled".to_string()]);
    }
}
