//! Parameters shared by the identity step family.

use crate::core::PlanNode;
use crate::errors::IdentityError;
use serde::{Deserialize, Serialize};

/// Name the engine uses to look up the parameter schema.
pub const IDENTITY_STEP_PARAMETERS: &str = "IdentityStepParameters";

/// Identifies the execution being replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityStepParameters {
    /// Execution id of the original run.
    pub original_node_execution_id: String,
}

impl IdentityStepParameters {
    /// Creates parameters for replaying `original_node_execution_id`.
    #[must_use]
    pub fn new(original_node_execution_id: impl Into<String>) -> Self {
        Self {
            original_node_execution_id: original_node_execution_id.into(),
        }
    }

    /// Reads parameters from the engine's JSON payload.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, IdentityError> {
        let params: Self = serde_json::from_value(value.clone())
            .map_err(|e| IdentityError::InvalidParameters(e.to_string()))?;
        if params.original_node_execution_id.is_empty() {
            return Err(IdentityError::InvalidParameters(
                "original_node_execution_id is empty".to_string(),
            ));
        }
        Ok(params)
    }

    /// Parameters for running an identity plan node; `None` for standard nodes.
    #[must_use]
    pub fn for_node(node: &PlanNode) -> Option<Self> {
        node.original_execution_id().map(Self::new)
    }

    /// JSON payload for the engine.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({ "original_node_execution_id": self.original_node_execution_id })
    }
}
