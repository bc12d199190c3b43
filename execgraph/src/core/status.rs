//! Execution status and execution mode enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Queued, not yet started.
    Queued,
    /// Currently running.
    Running,
    /// Waiting on an async callback.
    AsyncWaiting,
    /// Waiting on a delegated task.
    TaskWaiting,
    /// Waiting on a manual intervention.
    InterventionWaiting,
    /// Waiting on an approval.
    ApprovalWaiting,
    /// Paused by a user.
    Paused,
    /// Being aborted.
    Discontinuing,
    /// Skipped by a condition.
    Skipped,
    /// Completed successfully.
    Succeeded,
    /// Failed, but the failure was ignored by a strategy.
    IgnoreFailed,
    /// Failed.
    Failed,
    /// Errored before completion.
    Errored,
    /// Timed out.
    Expired,
    /// An approval was rejected.
    ApprovalRejected,
    /// Aborted by a user or parent.
    Aborted,
}

impl Default for Status {
    fn default() -> Self {
        Self::Queued
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::AsyncWaiting => "ASYNC_WAITING",
            Self::TaskWaiting => "TASK_WAITING",
            Self::InterventionWaiting => "INTERVENTION_WAITING",
            Self::ApprovalWaiting => "APPROVAL_WAITING",
            Self::Paused => "PAUSED",
            Self::Discontinuing => "DISCONTINUING",
            Self::Skipped => "SKIPPED",
            Self::Succeeded => "SUCCEEDED",
            Self::IgnoreFailed => "IGNORE_FAILED",
            Self::Failed => "FAILED",
            Self::Errored => "ERRORED",
            Self::Expired => "EXPIRED",
            Self::ApprovalRejected => "APPROVAL_REJECTED",
            Self::Aborted => "ABORTED",
        };
        write!(f, "{name}")
    }
}

/// Broke statuses ordered from most to least severe.
const BROKE_AND_ABORTED_BY_SEVERITY: [Status; 5] = [
    Status::Aborted,
    Status::Errored,
    Status::Failed,
    Status::Expired,
    Status::ApprovalRejected,
];

impl Status {
    /// Statuses that mean the step broke.
    #[must_use]
    pub fn broke_statuses() -> &'static [Status] {
        &BROKE_AND_ABORTED_BY_SEVERITY[1..]
    }

    /// Broke statuses plus [`Status::Aborted`].
    #[must_use]
    pub fn broke_and_aborted_statuses() -> &'static [Status] {
        &BROKE_AND_ABORTED_BY_SEVERITY
    }

    /// Returns true if the execution broke (failed, errored, expired or rejected).
    #[must_use]
    pub fn is_broke(&self) -> bool {
        Self::broke_statuses().contains(self)
    }

    /// Returns true if the execution broke or was aborted.
    ///
    /// Such executions are never replayed by identity cloning.
    #[must_use]
    pub fn is_broke_or_aborted(&self) -> bool {
        Self::broke_and_aborted_statuses().contains(self)
    }

    /// Returns true if the status can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Skipped | Self::Succeeded | Self::IgnoreFailed
        ) || self.is_broke_or_aborted()
    }

    /// Computes the composite status of a fan-out from its children.
    ///
    /// The most severe broke status wins; otherwise `Skipped` if every child
    /// skipped, `IgnoreFailed` if any child ignore-failed, else `Succeeded`.
    #[must_use]
    pub fn aggregate<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let statuses: Vec<Self> = statuses.into_iter().collect();
        if statuses.is_empty() {
            return Self::Succeeded;
        }
        if let Some(worst) = BROKE_AND_ABORTED_BY_SEVERITY
            .iter()
            .find(|candidate| statuses.contains(*candidate))
        {
            return *worst;
        }
        if statuses.iter().all(|s| *s == Self::Skipped) {
            return Self::Skipped;
        }
        if statuses.contains(&Self::IgnoreFailed) {
            return Self::IgnoreFailed;
        }
        Self::Succeeded
    }
}

/// How an execution asked the engine to run it.
///
/// The graph builder matches on this exhaustively, so a new mode must be
/// placed explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    /// Runs inline and returns.
    Sync,
    /// Delegates to an external task.
    Task,
    /// Wraps a single child.
    Child,
    /// Fans out into parallel children.
    Children,
    /// Runs children one after another.
    ChildChain,
}

impl ExecutionMode {
    /// Returns true for modes whose children are tracked via the fan-out list.
    #[must_use]
    pub fn is_fan_out(&self) -> bool {
        matches!(self, Self::Children | Self::ChildChain)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "SYNC"),
            Self::Task => write!(f, "TASK"),
            Self::Child => write!(f, "CHILD"),
            Self::Children => write!(f, "CHILDREN"),
            Self::ChildChain => write!(f, "CHILD_CHAIN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broke_sets() {
        assert!(Status::Failed.is_broke());
        assert!(!Status::Aborted.is_broke());
        assert!(Status::Aborted.is_broke_or_aborted());
        assert!(!Status::Succeeded.is_broke_or_aborted());
        assert!(!Status::Running.is_broke_or_aborted());
        assert_eq!(Status::broke_statuses().len(), 4);
    }

    #[test]
    fn test_terminal() {
        assert!(Status::Succeeded.is_terminal());
        assert!(Status::Expired.is_terminal());
        assert!(!Status::AsyncWaiting.is_terminal());
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(Status::aggregate(Vec::new()), Status::Succeeded);
        assert_eq!(
            Status::aggregate([Status::Succeeded, Status::Failed, Status::Aborted]),
            Status::Aborted
        );
        assert_eq!(
            Status::aggregate([Status::Expired, Status::Errored]),
            Status::Errored
        );
        assert_eq!(
            Status::aggregate([Status::Skipped, Status::Skipped]),
            Status::Skipped
        );
        assert_eq!(
            Status::aggregate([Status::Skipped, Status::Succeeded]),
            Status::Succeeded
        );
        assert_eq!(
            Status::aggregate([Status::IgnoreFailed, Status::Succeeded]),
            Status::IgnoreFailed
        );
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&Status::IgnoreFailed).unwrap();
        assert_eq!(json, r#""IGNORE_FAILED""#);
        assert_eq!(Status::IgnoreFailed.to_string(), "IGNORE_FAILED");

        let mode: ExecutionMode = serde_json::from_str(r#""CHILD_CHAIN""#).unwrap();
        assert_eq!(mode, ExecutionMode::ChildChain);
        assert!(mode.is_fan_out());
        assert!(!ExecutionMode::Child.is_fan_out());
    }
}
