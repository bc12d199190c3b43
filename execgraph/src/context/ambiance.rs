//! The execution-context stack carried alongside every execution record.

use crate::core::StepType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marks a level produced by strategy (matrix / for-each) expansion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrategyMetadata {
    /// Zero-based iteration index.
    pub current_iteration: u32,
    /// Total number of iterations.
    pub total_iterations: u32,
    /// Matrix axis values for this iteration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub matrix_values: BTreeMap<String, String>,
}

impl StrategyMetadata {
    /// Creates metadata for one iteration.
    #[must_use]
    pub fn new(current_iteration: u32, total_iterations: u32) -> Self {
        Self {
            current_iteration,
            total_iterations,
            matrix_values: BTreeMap::new(),
        }
    }

    /// Adds a matrix axis value.
    #[must_use]
    pub fn with_matrix_value(mut self, axis: impl Into<String>, value: impl Into<String>) -> Self {
        self.matrix_values.insert(axis.into(), value.into());
        self
    }
}

/// One level of the context stack (pipeline, stage, step, iteration...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    /// Plan node id of the level.
    pub setup_id: String,
    /// Execution id of the level.
    pub runtime_id: String,
    /// User-facing identifier.
    pub identifier: String,
    /// Step type the engine dispatches on.
    pub step_type: StepType,
    /// Present when the level came from strategy expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_metadata: Option<StrategyMetadata>,
}

impl Level {
    /// Creates a level.
    #[must_use]
    pub fn new(
        setup_id: impl Into<String>,
        runtime_id: impl Into<String>,
        identifier: impl Into<String>,
        step_type: StepType,
    ) -> Self {
        Self {
            setup_id: setup_id.into(),
            runtime_id: runtime_id.into(),
            identifier: identifier.into(),
            step_type,
            strategy_metadata: None,
        }
    }

    /// Attaches strategy metadata.
    #[must_use]
    pub fn with_strategy_metadata(mut self, metadata: StrategyMetadata) -> Self {
        self.strategy_metadata = Some(metadata);
        self
    }

    /// Returns true if this level is a strategy.
    #[must_use]
    pub fn is_strategy(&self) -> bool {
        self.step_type.is_strategy()
    }
}

/// The stack of nested execution-context levels, outermost first.
///
/// Values are immutable in practice: every transformation returns a new
/// `Ambiance`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ambiance {
    /// The pipeline run.
    pub plan_execution_id: String,
    /// Levels, outermost first.
    #[serde(default)]
    pub levels: Vec<Level>,
}

impl Ambiance {
    /// Creates an empty ambiance for a pipeline run.
    #[must_use]
    pub fn new(plan_execution_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            levels: Vec::new(),
        }
    }

    /// Returns a copy with `level` pushed as the new innermost level.
    #[must_use]
    pub fn with_level(&self, level: Level) -> Self {
        let mut next = self.clone();
        next.levels.push(level);
        next
    }

    /// The innermost level.
    #[must_use]
    pub fn current_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    /// The level enclosing the innermost one.
    #[must_use]
    pub fn parent_level(&self) -> Option<&Level> {
        self.levels.len().checked_sub(2).and_then(|i| self.levels.get(i))
    }

    /// Execution id of the innermost level.
    #[must_use]
    pub fn current_runtime_id(&self) -> Option<&str> {
        self.current_level().map(|level| level.runtime_id.as_str())
    }

    /// Step type of the innermost level.
    #[must_use]
    pub fn current_step_type(&self) -> Option<&StepType> {
        self.current_level().map(|level| &level.step_type)
    }

    /// Returns true if the innermost level sits directly below a strategy.
    ///
    /// A level carrying strategy metadata is an expanded iteration and
    /// counts as well.
    #[must_use]
    pub fn is_under_strategy(&self) -> bool {
        self.parent_level().is_some_and(Level::is_strategy)
            || self
                .current_level()
                .is_some_and(|level| level.strategy_metadata.is_some())
    }

    /// Returns a copy whose innermost step type routes to the identity handlers.
    ///
    /// Strategy levels become `IDENTITY_STRATEGY`, levels under a strategy
    /// become `IDENTITY_STRATEGY_INTERNAL`, everything else `IDENTITY_STEP`.
    /// Retagging an already retagged ambiance returns an equal value.
    #[must_use]
    pub fn retag_for_identity(&self) -> Self {
        let under_strategy = self.is_under_strategy();
        let mut next = self.clone();
        if let Some(level) = next.levels.last_mut() {
            level.step_type = level.step_type.identity_counterpart(under_strategy);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        StepCategory, IDENTITY_STEP, IDENTITY_STRATEGY, IDENTITY_STRATEGY_INTERNAL,
    };

    fn stage_ambiance() -> Ambiance {
        Ambiance::new("plan-exec-1")
            .with_level(Level::new(
                "pipeline-node",
                "pipeline-exec",
                "pipeline",
                StepType::new("PIPELINE_SECTION", StepCategory::Pipeline),
            ))
            .with_level(Level::new(
                "stage-node",
                "stage-exec",
                "deploy",
                StepType::new("DEPLOYMENT_STAGE", StepCategory::Stage),
            ))
    }

    #[test]
    fn test_retag_plain_step() {
        let ambiance = stage_ambiance();
        let retagged = ambiance.retag_for_identity();

        assert_eq!(retagged.current_step_type().unwrap().type_name, IDENTITY_STEP);
        assert_eq!(
            retagged.current_step_type().unwrap().category,
            StepCategory::Stage
        );
        // The input value is untouched.
        assert_eq!(
            ambiance.current_step_type().unwrap().type_name,
            "DEPLOYMENT_STAGE"
        );
        // Outer levels are untouched.
        assert_eq!(retagged.levels[0], ambiance.levels[0]);
    }

    #[test]
    fn test_retag_strategy_level() {
        let ambiance = stage_ambiance().with_level(Level::new(
            "matrix-node",
            "matrix-exec",
            "deploy_matrix",
            StepType::new("MATRIX", StepCategory::Strategy),
        ));
        let retagged = ambiance.retag_for_identity();
        assert_eq!(
            retagged.current_step_type().unwrap().type_name,
            IDENTITY_STRATEGY
        );
    }

    #[test]
    fn test_retag_iteration_under_strategy() {
        let ambiance = stage_ambiance()
            .with_level(Level::new(
                "matrix-node",
                "matrix-exec",
                "deploy_matrix",
                StepType::new("MATRIX", StepCategory::Strategy),
            ))
            .with_level(
                Level::new(
                    "step-node",
                    "step-exec-0",
                    "deploy_0",
                    StepType::new("ShellScript", StepCategory::Step),
                )
                .with_strategy_metadata(StrategyMetadata::new(0, 2).with_matrix_value("env", "qa")),
            );
        assert!(ambiance.is_under_strategy());

        let retagged = ambiance.retag_for_identity();
        assert_eq!(
            retagged.current_step_type().unwrap().type_name,
            IDENTITY_STRATEGY_INTERNAL
        );
        assert_eq!(retagged.retag_for_identity(), retagged);
    }

    #[test]
    fn test_empty_ambiance_retag_is_noop() {
        let ambiance = Ambiance::new("plan-exec-1");
        assert_eq!(ambiance.retag_for_identity(), ambiance);
        assert!(ambiance.parent_level().is_none());
        assert!(ambiance.current_runtime_id().is_none());
    }
}
