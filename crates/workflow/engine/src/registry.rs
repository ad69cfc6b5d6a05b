//! Registration table for activities and workflows
//!
//! Handlers are registered under their stable names while the process starts.
//! [`RegistryBuilder::build`] checks that every workflow only schedules
//! registered activities, so a missing handler is a startup error rather
//! than a failed lookup halfway through a teardown.

use crate::activity::Activity;
use crate::workflow::{ErasedWorkflow, TypedWorkflow, Workflow};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use workflow_types::{RetryPolicy, WorkflowError, WorkflowResult};

/// Registration failures, all detected before any run starts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("activity '{0}' is already registered")]
    DuplicateActivity(String),

    #[error("workflow '{0}' is already registered")]
    DuplicateWorkflow(String),

    #[error("workflow '{workflow}' schedules unregistered activity '{activity}'")]
    MissingActivity { workflow: String, activity: String },
}

struct ActivityEntry {
    handler: Arc<dyn Any + Send + Sync>,
    retry: Option<RetryPolicy>,
}

struct WorkflowEntry {
    handler: Arc<dyn ErasedWorkflow>,
    activities: &'static [&'static str],
}

/// Resolved handler for one activity type
pub(crate) struct ActivityHandle<A> {
    pub activity: Arc<A>,
    pub retry: Option<RetryPolicy>,
}

/// Collects registrations; consumed by [`RegistryBuilder::build`]
#[derive(Default)]
pub struct RegistryBuilder {
    activities: HashMap<&'static str, ActivityEntry>,
    workflows: HashMap<&'static str, WorkflowEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity that runs exactly once per invocation
    pub fn register_activity<A: Activity>(
        &mut self,
        activity: A,
    ) -> Result<&mut Self, RegistryError> {
        self.insert_activity(activity, None)
    }

    /// Register an activity with a retry policy applied to every invocation
    pub fn register_activity_with_retry<A: Activity>(
        &mut self,
        activity: A,
        retry: RetryPolicy,
    ) -> Result<&mut Self, RegistryError> {
        self.insert_activity(activity, Some(retry))
    }

    fn insert_activity<A: Activity>(
        &mut self,
        activity: A,
        retry: Option<RetryPolicy>,
    ) -> Result<&mut Self, RegistryError> {
        if self.activities.contains_key(A::NAME) {
            return Err(RegistryError::DuplicateActivity(A::NAME.to_string()));
        }

        self.activities.insert(
            A::NAME,
            ActivityEntry {
                handler: Arc::new(activity),
                retry,
            },
        );

        tracing::debug!(activity = A::NAME, "Activity registered");
        Ok(self)
    }

    pub fn register_workflow<W: Workflow>(
        &mut self,
        workflow: W,
    ) -> Result<&mut Self, RegistryError> {
        if self.workflows.contains_key(W::NAME) {
            return Err(RegistryError::DuplicateWorkflow(W::NAME.to_string()));
        }

        self.workflows.insert(
            W::NAME,
            WorkflowEntry {
                handler: Arc::new(TypedWorkflow(workflow)),
                activities: W::ACTIVITIES,
            },
        );

        tracing::debug!(workflow = W::NAME, "Workflow registered");
        Ok(self)
    }

    /// Validate every workflow's declared activities and freeze the table
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut workflow_names: Vec<_> = self.workflows.keys().copied().collect();
        workflow_names.sort_unstable();

        for name in workflow_names {
            let entry = &self.workflows[name];
            if let Some(missing) = entry
                .activities
                .iter()
                .find(|activity| !self.activities.contains_key(*activity))
            {
                return Err(RegistryError::MissingActivity {
                    workflow: name.to_string(),
                    activity: missing.to_string(),
                });
            }
        }

        tracing::info!(
            activities = self.activities.len(),
            workflows = self.workflows.len(),
            "Registry built"
        );

        Ok(Registry {
            activities: self.activities,
            workflows: self.workflows,
        })
    }
}

/// Immutable registration table shared by every run
pub struct Registry {
    activities: HashMap<&'static str, ActivityEntry>,
    workflows: HashMap<&'static str, WorkflowEntry>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn has_activity(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    pub fn has_workflow(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Registered activity names, sorted
    pub fn activity_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.activities.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Registered workflow names, sorted
    pub fn workflow_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.workflows.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn activity<A: Activity>(&self) -> WorkflowResult<ActivityHandle<A>> {
        let entry = self
            .activities
            .get(A::NAME)
            .ok_or_else(|| WorkflowError::NotRegistered(format!("activity '{}'", A::NAME)))?;

        let activity = entry.handler.clone().downcast::<A>().map_err(|_| {
            WorkflowError::NotRegistered(format!(
                "activity '{}' is registered with a different type",
                A::NAME
            ))
        })?;

        Ok(ActivityHandle {
            activity,
            retry: entry.retry.clone(),
        })
    }

    pub(crate) fn workflow(&self, name: &str) -> WorkflowResult<Arc<dyn ErasedWorkflow>> {
        self.workflows
            .get(name)
            .map(|entry| entry.handler.clone())
            .ok_or_else(|| WorkflowError::NotRegistered(format!("workflow '{}'", name)))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("activities", &self.activity_names())
            .field("workflows", &self.workflow_names())
            .finish()
    }
}
