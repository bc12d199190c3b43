//! Event emission for identity decisions.
//!
//! Sinks are injected into the [`crate::identity::IdentityDispatcher`]; the
//! default discards everything.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Emitted after an identity step produced its next action.
pub const IDENTITY_DECIDED: &str = "identity.decided";

/// Emitted when an identity decision failed and was surfaced as a step failure.
pub const IDENTITY_FAILED: &str = "identity.failed";
