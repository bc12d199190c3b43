//! Execution records: the append-only log of step runs.

use super::{ExecutableResponse, ExecutionMode, PlanNode, Status};
use crate::context::Ambiance;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// Mode-specific parameters resolved when the step started.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedParameters {
    /// For fan-out modes, the ordered plan node ids of the children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_node_ids: Vec<String>,
    /// Everything else, opaque to this crate.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub values: serde_json::Value,
}

impl ResolvedParameters {
    /// Creates parameters listing fan-out children.
    #[must_use]
    pub fn with_children<I, S>(child_node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            child_node_ids: child_node_ids.into_iter().map(Into::into).collect(),
            values: serde_json::Value::Null,
        }
    }

    /// Returns true if `plan_node_id` is one of the listed fan-out children.
    #[must_use]
    pub fn lists_child(&self, plan_node_id: &str) -> bool {
        self.child_node_ids.iter().any(|id| id == plan_node_id)
    }
}

/// One step's execution instance.
///
/// Created by the execution engine when a step starts and only ever updated
/// with status, `next_id` and timestamps. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique execution id.
    pub id: String,
    /// The pipeline run this record belongs to.
    #[serde(default)]
    pub plan_execution_id: String,
    /// The static step definition this instance runs.
    pub plan_node_id: String,
    /// The plan node itself, when projected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<PlanNode>,
    /// Enclosing composite step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Preceding sibling in a sequential chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    /// Following sibling, set once the chain advances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_id: Option<String>,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Current status.
    #[serde(default)]
    pub status: Status,
    /// Mode-specific resolved parameters.
    #[serde(default)]
    pub resolved_parameters: ResolvedParameters,
    /// Execution context stack, when projected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiance: Option<Ambiance>,
    /// Instructions handed back to the engine, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executable_responses: Vec<ExecutableResponse>,
    /// Superseded by a later retry of the same node.
    #[serde(default)]
    pub old_retry: bool,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl ExecutionRecord {
    /// Creates a queued record created now.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        plan_node_id: impl Into<String>,
        mode: ExecutionMode,
    ) -> Self {
        let now = now_utc();
        Self {
            id: id.into(),
            plan_execution_id: String::new(),
            plan_node_id: plan_node_id.into(),
            node: None,
            parent_id: None,
            previous_id: None,
            next_id: None,
            mode,
            status: Status::default(),
            resolved_parameters: ResolvedParameters::default(),
            ambiance: None,
            executable_responses: Vec::new(),
            old_retry: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches the plan node; `plan_node_id` follows it.
    #[must_use]
    pub fn with_node(mut self, node: PlanNode) -> Self {
        self.plan_node_id = node.uuid().to_string();
        self.node = Some(node);
        self
    }

    /// Sets the parent execution.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the previous sibling.
    #[must_use]
    pub fn with_previous(mut self, previous_id: impl Into<String>) -> Self {
        self.previous_id = Some(previous_id.into());
        self
    }

    /// Sets the next sibling.
    #[must_use]
    pub fn with_next(mut self, next_id: impl Into<String>) -> Self {
        self.next_id = Some(next_id.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Sets the resolved parameters.
    #[must_use]
    pub fn with_resolved_parameters(mut self, parameters: ResolvedParameters) -> Self {
        self.resolved_parameters = parameters;
        self
    }

    /// Sets the ambiance.
    #[must_use]
    pub fn with_ambiance(mut self, ambiance: Ambiance) -> Self {
        self.plan_execution_id = ambiance.plan_execution_id.clone();
        self.ambiance = Some(ambiance);
        self
    }

    /// Appends an executable response.
    #[must_use]
    pub fn with_executable_response(mut self, response: ExecutableResponse) -> Self {
        self.executable_responses.push(response);
        self
    }

    /// Marks the record as superseded by a later retry.
    #[must_use]
    pub fn as_old_retry(mut self) -> Self {
        self.old_retry = true;
        self
    }

    /// Sets both creation and update time.
    #[must_use]
    pub fn created_at(mut self, at: Timestamp) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    /// Sets the update time.
    #[must_use]
    pub fn updated_at(mut self, at: Timestamp) -> Self {
        self.updated_at = at;
        self
    }

    /// The most recent executable response, if any.
    #[must_use]
    pub fn last_executable_response(&self) -> Option<&ExecutableResponse> {
        self.executable_responses.last()
    }

    /// Returns true if the record has neither a parent nor a previous sibling.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() && self.previous_id.is_none()
    }
}
