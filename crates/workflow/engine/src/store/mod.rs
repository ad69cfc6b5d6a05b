//! Durable history stores
//!
//! A store keeps one append-only event list per run. Event ids are assigned by
//! the store, start at 1 and increase by one per append within a run.

mod file;
mod memory;

pub use file::FileHistoryStore;
pub use memory::InMemoryHistoryStore;

use async_trait::async_trait;
use thiserror::Error;
use workflow_types::{HistoryEvent, HistoryRecord, RunId, WorkflowError};

/// History store errors
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt history for run {run_id} at line {line}: {reason}")]
    Corrupt {
        run_id: RunId,
        line: usize,
        reason: String,
    },

    #[error("invalid run id '{0}'")]
    InvalidRunId(RunId),
}

impl From<HistoryError> for WorkflowError {
    fn from(err: HistoryError) -> Self {
        WorkflowError::History(err.to_string())
    }
}

/// Result type for history store operations
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Append-only storage for run histories, safe for concurrent use
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an event and return it with its assigned event id
    async fn append(&self, run_id: &RunId, event: HistoryEvent) -> HistoryResult<HistoryRecord>;

    /// Full history of a run in event id order; empty for an unknown run
    async fn load(&self, run_id: &RunId) -> HistoryResult<Vec<HistoryRecord>>;

    /// Every run with at least one recorded event, sorted by id
    async fn list_runs(&self) -> HistoryResult<Vec<RunId>>;
}
