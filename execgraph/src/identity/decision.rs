//! What an identity step hands back to the engine.

use crate::context::Ambiance;
use crate::core::{ChildExecutableResponse, ChildrenExecutableResponse, PlanNode, StepResponse};
use std::fmt;

/// The next thing the engine should do for an identity execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Done; the clone reports this response without running anything.
    Terminal(StepResponse),
    /// Start one child and call back with its response.
    WaitChild(ChildExecutableResponse),
    /// Start these children and call back with their responses.
    WaitChildren(ChildrenExecutableResponse),
}

impl NextAction {
    /// Short label used in logs and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Terminal(_) => "terminal",
            Self::WaitChild(_) => "wait_child",
            Self::WaitChildren(_) => "wait_children",
        }
    }

    /// Returns true if the engine has nothing left to schedule.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// Plan node ids the engine must start next.
    #[must_use]
    pub fn child_node_ids(&self) -> Vec<&str> {
        match self {
            Self::Terminal(_) => Vec::new(),
            Self::WaitChild(child) => vec![child.child_node_id.as_str()],
            Self::WaitChildren(children) => children.children.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(response) => write!(f, "terminal({})", response.status),
            Self::WaitChild(child) => write!(f, "wait_child({})", child.child_node_id),
            Self::WaitChildren(children) => write!(
                f,
                "wait_children({}, max_concurrency={})",
                children.children.len(),
                children.max_concurrency
            ),
        }
    }
}

/// One identity decision: the next action plus what the engine needs to
/// continue from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDecision {
    /// Ambiance of the identity execution, retagged for identity dispatch.
    pub ambiance: Ambiance,
    /// What to do next.
    pub action: NextAction,
    /// Identity nodes persisted for the children in `action`.
    pub identity_nodes: Vec<PlanNode>,
}

impl IdentityDecision {
    /// A decision that persisted no identity nodes.
    #[must_use]
    pub fn new(ambiance: Ambiance, action: NextAction) -> Self {
        Self {
            ambiance,
            action,
            identity_nodes: Vec::new(),
        }
    }

    /// Attaches the persisted identity nodes.
    #[must_use]
    pub fn with_identity_nodes(mut self, nodes: Vec<PlanNode>) -> Self {
        self.identity_nodes = nodes;
        self
    }

    /// Looks up the persisted identity node with this plan node id.
    #[must_use]
    pub fn identity_node(&self, uuid: &str) -> Option<&PlanNode> {
        self.identity_nodes.iter().find(|node| node.uuid() == uuid)
    }
}
