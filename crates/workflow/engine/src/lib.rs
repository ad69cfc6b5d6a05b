//! Durable workflow runtime
//!
//! Runs deterministic orchestration procedures whose progress is recorded in an
//! append-only history, so a run survives process restarts without losing or
//! repeating completed work.
//!
//! # Architecture
//!
//! - [`Activity`] wraps one idempotent, side-effecting operation
//! - [`Workflow`] sequences phases and fans activities out within a phase
//! - [`Registry`] maps stable names to typed handlers, validated at startup
//! - [`ActivityDispatcher`] runs invocations on a bounded pool with timeouts and retry
//! - [`WorkflowContext`] records every decision and replays it after a restart
//! - [`HistoryStore`] persists run histories (in memory or as JSON lines)
//! - [`WorkflowRuntime`] submits, waits on, cancels and resumes runs
//!
//! Cancellation is only ever observed at phase boundaries. Activities already
//! in flight always run to completion or to their own timeout.

#![deny(unsafe_code)]

pub mod activity;
pub mod context;
pub mod dispatcher;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod workflow;

pub use activity::Activity;
pub use context::WorkflowContext;
pub use dispatcher::{ActivityDispatcher, DEFAULT_MAX_CONCURRENT_ACTIVITIES};
pub use registry::{Registry, RegistryBuilder, RegistryError};
pub use runtime::{RuntimeConfig, WorkflowRuntime};
pub use store::{FileHistoryStore, HistoryError, HistoryResult, HistoryStore, InMemoryHistoryStore};
pub use workflow::Workflow;

pub use workflow_types as types;
