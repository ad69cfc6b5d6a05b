//! Durable run history
//!
//! A run is fully described by its append-only event list. The orchestrator
//! never keeps progress anywhere else: after a restart the control flow is
//! re-executed against the recorded events, completed activities are answered
//! from history, and only unfinished work is dispatched again.

use crate::error::{ActivityFailure, WorkflowError};
use crate::ids::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded fact about a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// First event of every run. Carries the workflow name and its input.
    WorkflowStarted {
        workflow: String,
        input: serde_json::Value,
    },

    /// The orchestrator crossed a phase boundary and entered `phase`.
    PhaseStarted { index: u64, phase: String },

    /// An activity invocation was handed to the dispatcher.
    ActivityScheduled {
        seq: u64,
        activity: String,
        target: String,
    },

    ActivityCompleted {
        seq: u64,
        output: serde_json::Value,
    },

    ActivityFailed {
        seq: u64,
        failure: ActivityFailure,
    },

    /// Cancellation was requested; honored at the next unstarted phase.
    CancelRequested,

    WorkflowCompleted { output: serde_json::Value },

    WorkflowFailed { error: WorkflowError },
}

impl HistoryEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HistoryEvent::WorkflowCompleted { .. } | HistoryEvent::WorkflowFailed { .. }
        )
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEvent::WorkflowStarted { .. } => "workflow_started",
            HistoryEvent::PhaseStarted { .. } => "phase_started",
            HistoryEvent::ActivityScheduled { .. } => "activity_scheduled",
            HistoryEvent::ActivityCompleted { .. } => "activity_completed",
            HistoryEvent::ActivityFailed { .. } => "activity_failed",
            HistoryEvent::CancelRequested => "cancel_requested",
            HistoryEvent::WorkflowCompleted { .. } => "workflow_completed",
            HistoryEvent::WorkflowFailed { .. } => "workflow_failed",
        }
    }
}

/// A history event as persisted by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub run_id: RunId,
    /// Position in the run's history, starting at 1
    pub event_id: u64,
    pub event: HistoryEvent,
    /// Metadata only; never read by control flow
    pub recorded_at: DateTime<Utc>,
}

/// Externally visible state of a run, derived from its history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// No history recorded yet
    Pending,
    Running {
        workflow: String,
        cancel_requested: bool,
    },
    Completed {
        workflow: String,
        output: serde_json::Value,
    },
    Failed {
        workflow: String,
        error: WorkflowError,
    },
}

impl RunStatus {
    pub fn from_history(history: &[HistoryRecord]) -> Self {
        let workflow = history.iter().find_map(|r| match &r.event {
            HistoryEvent::WorkflowStarted { workflow, .. } => Some(workflow.clone()),
            _ => None,
        });

        let Some(workflow) = workflow else {
            return RunStatus::Pending;
        };

        let mut cancel_requested = false;
        for record in history {
            match &record.event {
                HistoryEvent::WorkflowCompleted { output } => {
                    return RunStatus::Completed {
                        workflow,
                        output: output.clone(),
                    };
                }
                HistoryEvent::WorkflowFailed { error } => {
                    return RunStatus::Failed {
                        workflow,
                        error: error.clone(),
                    };
                }
                HistoryEvent::CancelRequested => cancel_requested = true,
                _ => {}
            }
        }

        RunStatus::Running {
            workflow,
            cancel_requested,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed { .. } | RunStatus::Failed { .. })
    }
}
