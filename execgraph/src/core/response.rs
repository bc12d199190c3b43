//! What a step asked the engine to do, and what it finally reported.

use super::Status;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wait for a single child plan node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildExecutableResponse {
    /// The child plan node to start.
    pub child_node_id: String,
}

/// Wait for a set of children, optionally with bounded parallelism.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChildrenExecutableResponse {
    /// The child plan nodes to start, in order.
    pub children: Vec<String>,
    /// Maximum number of children running at once; 0 means unbounded.
    #[serde(default)]
    pub max_concurrency: u32,
}

/// Advance a chain by one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildChainExecutableResponse {
    /// The next child plan node in the chain.
    pub next_child_id: String,
    /// The previous child plan node, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_child_id: Option<String>,
    /// Whether this is the last link.
    #[serde(default)]
    pub last_link: bool,
}

/// The instruction an execution handed back to the engine.
///
/// Recorded on the execution record so a retry can replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutableResponse {
    /// Ran inline to completion.
    Sync,
    /// Delegated to an external task.
    Task {
        /// The delegated task id.
        task_id: String,
    },
    /// Waits on one child.
    Child(ChildExecutableResponse),
    /// Waits on several children.
    Children(ChildrenExecutableResponse),
    /// Waits on the next link of a chain.
    ChildChain(ChildChainExecutableResponse),
}

impl ExecutableResponse {
    /// Returns true for responses that waited on no children.
    #[must_use]
    pub fn is_terminal_leaf(&self) -> bool {
        matches!(self, Self::Sync | Self::Task { .. })
    }
}

/// Failure details attached to a step response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Human readable messages, one per failure.
    #[serde(default)]
    pub messages: Vec<String>,
}

impl FailureInfo {
    /// Creates failure info with a single message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    /// Returns true if no failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The terminal response of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResponse {
    /// Final status.
    pub status: Status,
    /// Failure details, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

impl StepResponse {
    /// Creates a response with the given status and no failure details.
    #[must_use]
    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            failure: None,
        }
    }

    /// Creates a failed response.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            failure: Some(FailureInfo::message(message)),
        }
    }

    /// Folds child results into a composite response.
    ///
    /// The status is [`Status::aggregate`] of the children; failure messages
    /// are collected in child id order.
    #[must_use]
    pub fn from_children(responses: &HashMap<String, StepResponseNotifyData>) -> Self {
        let mut ids: Vec<&String> = responses.keys().collect();
        ids.sort();

        let status = Status::aggregate(responses.values().map(|r| r.status));
        let messages: Vec<String> = ids
            .into_iter()
            .filter_map(|id| responses[id].failure.as_ref())
            .flat_map(|failure| failure.messages.iter().cloned())
            .collect();

        Self {
            status,
            failure: (!messages.is_empty()).then_some(FailureInfo { messages }),
        }
    }
}

/// Result data the engine delivers to a parent when a child finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResponseNotifyData {
    /// Plan node id of the finished child.
    pub node_id: String,
    /// Its final status.
    pub status: Status,
    /// Its failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

impl StepResponseNotifyData {
    /// Creates notify data without failure details.
    #[must_use]
    pub fn new(node_id: impl Into<String>, status: Status) -> Self {
        Self {
            node_id: node_id.into(),
            status,
            failure: None,
        }
    }

    /// Attaches a failure message.
    #[must_use]
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(FailureInfo::message(message));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_children_aggregates() {
        let mut responses = HashMap::new();
        responses.insert(
            "b".to_string(),
            StepResponseNotifyData::new("node-b", Status::Failed).with_failure("b broke"),
        );
        responses.insert(
            "a".to_string(),
            StepResponseNotifyData::new("node-a", Status::Succeeded),
        );
        responses.insert(
            "c".to_string(),
            StepResponseNotifyData::new("node-c", Status::Expired).with_failure("c timed out"),
        );

        let response = StepResponse::from_children(&responses);
        assert_eq!(response.status, Status::Failed);
        assert_eq!(
            response.failure.unwrap().messages,
            vec!["b broke".to_string(), "c timed out".to_string()]
        );
    }

    #[test]
    fn test_from_children_all_success_has_no_failure() {
        let mut responses = HashMap::new();
        responses.insert(
            "a".to_string(),
            StepResponseNotifyData::new("node-a", Status::Succeeded),
        );
        let response = StepResponse::from_children(&responses);
        assert_eq!(response, StepResponse::with_status(Status::Succeeded));
    }

    #[test]
    fn test_executable_response_serialization() {
        let response = ExecutableResponse::Children(ChildrenExecutableResponse {
            children: vec!["n1".to_string()],
            max_concurrency: 2,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["type"], "CHILDREN");
        assert_eq!(json["max_concurrency"], 2);
        assert!(!response.is_terminal_leaf());
        assert!(ExecutableResponse::Sync.is_terminal_leaf());
    }
}
