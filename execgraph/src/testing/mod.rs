//! In-memory collaborators and fixtures for exercising identity retry and
//! graph construction without an engine.

mod fixtures;
mod mocks;

pub use fixtures::RecordFixture;
pub use mocks::{
    CloneCall, CloneKind, InMemoryExecutionStore, InMemoryPlanMutator, RecordingCloner,
    TestServices,
};
