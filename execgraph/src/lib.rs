//! # Execgraph
//!
//! Execution-graph reconstruction and identity retry for pipeline step
//! records.
//!
//! - **Graph building**: turn the flat execution-record log of a pipeline
//!   run into vertices plus an adjacency map that distinguishes structural
//!   nesting (fan-out children, chain heads) from sequential chains.
//! - **Identity retry**: when a run is retried, replay executions that
//!   already finished instead of running them again, one tree level per
//!   engine tick. Failed or aborted work always runs again.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use execgraph::prelude::*;
//!
//! let graph = build_graph(&root_id, &records, false)?;
//! let json = serde_json::to_string(&graph)?;
//!
//! let dispatcher = IdentityDispatcher::new(IdentityServices::new(
//!     store, output_cloner, outcome_cloner, plan_mutator,
//! ));
//! let decision = dispatcher.obtain(&ambiance, &step_parameters).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod graph;
pub mod identity;
pub mod observability;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ExecGraphConfig, GraphConfig, IdentityConfig, LoggingConfig};
    pub use crate::context::{Ambiance, Level, StrategyMetadata};
    pub use crate::core::{
        ExecutableResponse, ExecutionMode, ExecutionRecord, PlanNode, SkipType, Status,
        StepCategory, StepResponse, StepResponseNotifyData, StepType,
    };
    pub use crate::errors::{
        CollaboratorError, ExecGraphError, GraphConstructionError, IdentityError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::graph::{build_graph, extend_graph, EdgeSet, Graph, GraphCache, VertexView};
    pub use crate::identity::{
        ExecutionRecordStore, IdentityDecision, IdentityDispatcher, IdentityServices,
        IdentityStepParameters, NextAction, OutcomeCloner, OutputCloner, PlanMutator,
    };
    pub use crate::observability::init_tracing;
    pub use crate::utils::{generate_uuid, Timestamp};
}
