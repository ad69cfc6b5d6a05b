//! Workflow domain types
//!
//! Shared vocabulary of the durable execution core: run identifiers, the
//! append-only history a run is replayed from, activity options, and the
//! failure taxonomy that flows from a single activity invocation up to a
//! workflow's terminal outcome.
//!
//! # Failure taxonomy
//!
//! - [`ActivityError`]: what went wrong inside one invocation
//! - [`ActivityFailure`]: an [`ActivityError`] tagged with the activity and
//!   the resource it targeted
//! - [`CompositeError`]: the fold of every failure of a parallel set
//! - [`WorkflowError`]: the terminal outcome of a failed run
//!
//! The [`combine`] reducer is the only way a [`CompositeError`] is built from
//! a set of results.

#![deny(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod history;
pub mod ids;
pub mod options;

pub use aggregate::{combine, CompositeError};
pub use error::{ActivityError, ActivityFailure, TimeoutKind, WorkflowError, WorkflowResult};
pub use history::{HistoryEvent, HistoryRecord, RunStatus};
pub use ids::RunId;
pub use options::{ActivityOptions, RetryPolicy};
