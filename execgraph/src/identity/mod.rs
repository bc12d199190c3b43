//! Identity retry: replaying finished executions instead of re-running them.
//!
//! When a pipeline is retried, executions that already succeeded are
//! replaced by identity nodes. An identity execution clones the original's
//! outputs and outcomes, then mirrors whatever the original asked the engine
//! to do. Children are materialised one level per engine tick: every
//! decision returns the next action plus the identity nodes it persisted,
//! and the engine calls back into the dispatcher for each child.
//!
//! Children that broke or were aborted are never replayed; they run again.

mod decision;
mod dispatcher;
mod handler;
mod params;
mod ports;
mod step;
mod strategy;
mod strategy_internal;


pub use decision::{IdentityDecision, NextAction};
pub use dispatcher::IdentityDispatcher;
pub use handler::{IdentityHandler, IdentityServices};
pub use params::{IdentityStepParameters, IDENTITY_STEP_PARAMETERS};
pub use ports::{
    ChildOrdering, ExecutionRecordStore, FieldProjection, OutcomeCloner, OutputCloner,
    PlanMutator,
};
pub use step::IdentityStep;
pub use strategy::IdentityStrategyStep;
pub use strategy_internal::IdentityStrategyInternalStep;
