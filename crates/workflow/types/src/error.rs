//! Failure taxonomy for activities and workflow runs

use crate::aggregate::CompositeError;
use crate::ids::RunId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Which of the two activity timeouts fired
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutKind {
    /// No worker picked the invocation up in time (schedule-to-start).
    Dispatch,
    /// The invocation started but did not finish in time (start-to-close).
    Execution,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutKind::Dispatch => write!(f, "dispatch"),
            TimeoutKind::Execution => write!(f, "execution"),
        }
    }
}

/// Failure of a single activity invocation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActivityError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{kind} timeout exceeded after {after:?}")]
    Timeout { kind: TimeoutKind, after: Duration },

    #[error("remote operation failed: {0}")]
    RemoteOperation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("payload error: {0}")]
    Payload(String),
}

impl ActivityError {
    /// Whether a retry policy may repeat the invocation after this error.
    ///
    /// Malformed input and payload errors fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ActivityError::InvalidInput(_) | ActivityError::Payload(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ActivityError::Timeout { .. })
    }
}

/// An [`ActivityError`] tagged with the activity and the resource it targeted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFailure {
    /// Registered activity name
    pub activity: String,
    /// Resource the invocation acted on (empty when not resource-scoped)
    pub target: String,
    /// What went wrong
    pub error: ActivityError,
}

impl ActivityFailure {
    pub fn new(activity: impl Into<String>, target: impl Into<String>, error: ActivityError) -> Self {
        Self {
            activity: activity.into(),
            target: target.into(),
            error,
        }
    }
}

impl std::fmt::Display for ActivityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.target.is_empty() {
            write!(f, "{}: {}", self.activity, self.error)
        } else {
            write!(f, "{} '{}': {}", self.activity, self.target, self.error)
        }
    }
}

impl std::error::Error for ActivityFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Terminal failure of a workflow run
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum WorkflowError {
    /// A phase's aggregated failure, reported verbatim
    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error("workflow canceled at phase boundary before '{phase}'")]
    Canceled { phase: String },

    #[error("not registered: {0}")]
    NotRegistered(String),

    #[error("run not found: {0}")]
    RunNotFound(RunId),

    #[error("history store error: {0}")]
    History(String),

    #[error("nondeterministic replay: {0}")]
    Nondeterminism(String),

    #[error("invalid workflow input: {0}")]
    Input(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Every constituent activity failure when this is a phase failure.
    pub fn failures(&self) -> &[ActivityFailure] {
        match self {
            WorkflowError::Composite(composite) => composite.failures(),
            _ => &[],
        }
    }
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
