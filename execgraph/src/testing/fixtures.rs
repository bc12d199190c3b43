//! Record and ambiance builders for tests.

use crate::context::{Ambiance, Level, StrategyMetadata};
use crate::core::{ExecutionMode, ExecutionRecord, PlanNode, StepCategory, StepType};
use crate::utils::{from_epoch_millis, Timestamp};

/// Builds records and ambiances for one pipeline run.
///
/// Each record gets a creation time 100ms after the previous one, so
/// insertion order is creation order unless a test overrides `created_at`.
/// Plan node ids are the identifier with a `-node` suffix.
#[derive(Debug, Clone)]
pub struct RecordFixture {
    plan_execution_id: String,
    clock_ms: i64,
}

impl RecordFixture {
    /// Creates a fixture for a pipeline run.
    #[must_use]
    pub fn new(plan_execution_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            clock_ms: 0,
        }
    }

    /// Plan node id used for `identifier`.
    #[must_use]
    pub fn node_id(identifier: &str) -> String {
        format!("{identifier}-node")
    }

    /// A plan node of the given category.
    #[must_use]
    pub fn node(identifier: &str, step_type: StepType) -> PlanNode {
        PlanNode::standard(Self::node_id(identifier), identifier, step_type)
    }

    /// A step record running a shell-script node.
    pub fn step(&mut self, id: &str, identifier: &str, mode: ExecutionMode) -> ExecutionRecord {
        self.record(
            id,
            Self::node(identifier, StepType::new("ShellScript", StepCategory::Step)),
            mode,
        )
    }

    /// A matrix strategy record fanning out to its iterations.
    pub fn strategy(&mut self, id: &str, identifier: &str) -> ExecutionRecord {
        self.record(
            id,
            Self::node(identifier, StepType::new("MATRIX", StepCategory::Strategy)),
            ExecutionMode::Children,
        )
    }

    /// A record for `node`, stamped with the next clock tick.
    pub fn record(&mut self, id: &str, node: PlanNode, mode: ExecutionMode) -> ExecutionRecord {
        self.clock_ms += 100;
        ExecutionRecord::new(id, node.uuid(), mode)
            .with_node(node)
            .with_ambiance(Ambiance::new(&self.plan_execution_id))
            .created_at(self.tick())
    }

    fn tick(&self) -> Timestamp {
        from_epoch_millis(self.clock_ms).unwrap_or_default()
    }

    /// Pipeline and stage levels.
    #[must_use]
    pub fn stage_ambiance(&self) -> Ambiance {
        Ambiance::new(&self.plan_execution_id)
            .with_level(Level::new(
                "pipeline-node",
                "pipeline-exec",
                "pipeline",
                StepType::new("PIPELINE_SECTION", StepCategory::Pipeline),
            ))
            .with_level(Level::new(
                "stage-node",
                "stage-exec",
                "stage",
                StepType::new("DEPLOYMENT_STAGE", StepCategory::Stage),
            ))
    }

    /// A plain step inside the stage, running as `runtime_id`.
    #[must_use]
    pub fn step_ambiance(&self, runtime_id: &str) -> Ambiance {
        self.stage_ambiance().with_level(Level::new(
            "step-node",
            runtime_id,
            "step",
            StepType::new("ShellScript", StepCategory::Step),
        ))
    }

    /// A matrix strategy inside the stage, running as `runtime_id`.
    #[must_use]
    pub fn strategy_ambiance(&self, runtime_id: &str) -> Ambiance {
        self.stage_ambiance().with_level(Level::new(
            "matrix-node",
            runtime_id,
            "matrix",
            StepType::new("MATRIX", StepCategory::Strategy),
        ))
    }

    /// The first iteration of a matrix, running as `runtime_id`.
    #[must_use]
    pub fn iteration_ambiance(&self, runtime_id: &str) -> Ambiance {
        self.strategy_ambiance("matrix-exec").with_level(
            Level::new(
                "iteration-node",
                runtime_id,
                "iteration",
                StepType::new("STEP_GROUP", StepCategory::StepGroup),
            )
            .with_strategy_metadata(StrategyMetadata::new(0, 1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_are_stamped_in_order() {
        let mut fx = RecordFixture::new("plan-exec-1");
        let first = fx.step("a", "a", ExecutionMode::Sync);
        let second = fx.strategy("b", "b");

        assert!(first.created_at < second.created_at);
        assert_eq!(first.plan_node_id, "a-node");
        assert_eq!(first.plan_execution_id, "plan-exec-1");
        assert!(second.node.unwrap().step_type().is_strategy());
    }

    #[test]
    fn test_iteration_is_under_strategy() {
        let fx = RecordFixture::new("plan-exec-1");
        assert!(fx.iteration_ambiance("x").is_under_strategy());
        assert!(!fx.step_ambiance("x").is_under_strategy());
        assert_eq!(fx.step_ambiance("x").current_runtime_id(), Some("x"));
    }
}
