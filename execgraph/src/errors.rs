//! Error types for the execgraph crate.
//!
//! Graph construction fails closed with [`GraphConstructionError`]; identity
//! retry decisions fail with [`IdentityError`], which the dispatcher surfaces
//! to the engine as a step failure. External collaborators report problems
//! through [`CollaboratorError`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The main error type for execgraph operations.
#[derive(Debug, Error)]
pub enum ExecGraphError {
    /// The execution records could not be assembled into a graph.
    #[error("{0}")]
    Graph(#[from] GraphConstructionError),

    /// An identity retry decision failed.
    #[error("{0}")]
    Identity(#[from] IdentityError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The tracing subscriber could not be installed.
    #[error("Observability error: {0}")]
    Observability(String),
}

/// Which pointer of an execution record failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The enclosing composite step.
    Parent,
    /// The preceding sibling in a chain.
    Previous,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Previous => write!(f, "previous"),
        }
    }
}

/// Raised when a set of execution records does not form a valid graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphConstructionError {
    /// The requested root id is not among the records.
    #[error("Root execution '{root_id}' not found in records")]
    RootNotFound {
        /// The requested root.
        root_id: String,
    },

    /// More than one record has neither a parent nor a previous sibling.
    #[error("Multiple graph roots found: {}", ids.join(", "))]
    MultipleRoots {
        /// The competing root ids, sorted.
        ids: Vec<String>,
    },

    /// The requested root of a full graph has a parent or previous sibling.
    #[error("Execution '{id}' is not a pipeline root")]
    NotARoot {
        /// The offending record.
        id: String,
    },

    /// A record points at an execution that never appeared.
    #[error("Execution '{id}' references unknown {kind} '{reference}'")]
    Unresolved {
        /// The record holding the dangling pointer.
        id: String,
        /// The id it points at.
        reference: String,
        /// Which pointer dangles.
        kind: ReferenceKind,
    },
}

impl GraphConstructionError {
    /// Returns a stable error code for API consumers.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RootNotFound { .. } => "GRAPH-ROOT-NOT-FOUND",
            Self::MultipleRoots { .. } => "GRAPH-MULTIPLE-ROOTS",
            Self::NotARoot { .. } => "GRAPH-NOT-A-ROOT",
            Self::Unresolved { .. } => "GRAPH-UNRESOLVED-REFERENCE",
        }
    }
}

/// Errors reported by external collaborators (record store, cloner, plan mutator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The requested entity does not exist.
    #[error("Not found: {id}")]
    NotFound {
        /// The missing id.
        id: String,
    },

    /// The collaborator could not be reached or failed internally.
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// The collaborator refused the request.
    #[error("Request rejected: {0}")]
    Rejected(String),
}

impl CollaboratorError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

/// Errors raised while deciding how to replay an original execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The original execution (or one it references) does not exist.
    #[error("Original execution not found: {id}")]
    NotFound {
        /// The missing execution id.
        id: String,
    },

    /// The original execution never recorded what it asked the engine to do.
    #[error("Execution '{id}' has no executable response to replay")]
    MissingExecutableResponse {
        /// The execution id.
        id: String,
    },

    /// The step parameters could not be read.
    #[error("Invalid identity step parameters: {0}")]
    InvalidParameters(String),

    /// Outputs or outcomes could not be cloned for the new execution.
    #[error("Failed to clone results of '{execution_id}': {reason}")]
    Clone {
        /// The original execution whose results were being cloned.
        execution_id: String,
        /// Collaborator message.
        reason: String,
    },

    /// The identity node cohort could not be persisted.
    #[error("Failed to persist {count} identity nodes: {reason}")]
    Persist {
        /// Size of the cohort that was rejected.
        count: usize,
        /// Collaborator message.
        reason: String,
    },

    /// The record store failed for a reason other than a missing record.
    #[error("Execution store error: {0}")]
    Store(String),
}

impl From<CollaboratorError> for IdentityError {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::NotFound { id } => Self::NotFound { id },
            other => Self::Store(other.to_string()),
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_codes() {
        let err = GraphConstructionError::MultipleRoots {
            ids: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.code(), "GRAPH-MULTIPLE-ROOTS");
        assert!(err.to_string().contains("a, b"));

        let err = GraphConstructionError::Unresolved {
            id: "child".to_string(),
            reference: "ghost".to_string(),
            kind: ReferenceKind::Previous,
        };
        assert_eq!(err.code(), "GRAPH-UNRESOLVED-REFERENCE");
        assert_eq!(
            err.to_string(),
            "Execution 'child' references unknown previous 'ghost'"
        );
    }

    #[test]
    fn test_collaborator_not_found_maps_to_identity_not_found() {
        let err: IdentityError = CollaboratorError::not_found("exec-1").into();
        assert_eq!(err, IdentityError::NotFound { id: "exec-1".to_string() });

        let err: IdentityError = CollaboratorError::Unavailable("db down".to_string()).into();
        assert!(matches!(err, IdentityError::Store(_)));
    }

    #[test]
    fn test_top_level_wraps_module_errors() {
        let err: ExecGraphError = GraphConstructionError::RootNotFound {
            root_id: "r".to_string(),
        }
        .into();
        assert!(matches!(err, ExecGraphError::Graph(_)));
    }
}
