//! Core types: statuses, plan nodes, execution records and step responses.

mod plan;
mod record;
mod response;
mod status;

pub use plan::{
    NodeDefinition, PlanNode, SkipType, StepCategory, StepType, IDENTITY_STEP,
    IDENTITY_STRATEGY, IDENTITY_STRATEGY_INTERNAL,
};
pub use record::{ExecutionRecord, ResolvedParameters};
pub use response::{
    ChildChainExecutableResponse, ChildExecutableResponse, ChildrenExecutableResponse,
    ExecutableResponse, FailureInfo, StepResponse, StepResponseNotifyData,
};
pub use status::{ExecutionMode, Status};
