//! Workflow runtime: submission, waiting, cancellation and resumption
//!
//! Every run executes as one spawned task driving its workflow against a
//! [`WorkflowContext`]. Progress lives only in the history store; the
//! in-process handle table just lets callers wait on and cancel live runs.

use crate::context::WorkflowContext;
use crate::dispatcher::{ActivityDispatcher, DEFAULT_MAX_CONCURRENT_ACTIVITIES};
use crate::registry::Registry;
use crate::store::HistoryStore;
use crate::workflow::{ErasedWorkflow, Workflow};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{instrument, Instrument};
use workflow_types::{
    ActivityOptions, HistoryEvent, HistoryRecord, RunId, RunStatus, WorkflowError, WorkflowResult,
};

/// Runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Options for activities until a workflow sets its own
    pub default_activity_options: ActivityOptions,
    /// Size of the shared activity worker pool
    pub max_concurrent_activities: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_activity_options: ActivityOptions::default(),
            max_concurrent_activities: DEFAULT_MAX_CONCURRENT_ACTIVITIES,
        }
    }
}

type Outcome = Option<WorkflowResult<Value>>;

struct RunHandle {
    cancel: watch::Sender<bool>,
    outcome: watch::Receiver<Outcome>,
}

/// Executes registered workflows against a history store
pub struct WorkflowRuntime {
    registry: Arc<Registry>,
    store: Arc<dyn HistoryStore>,
    dispatcher: ActivityDispatcher,
    config: RuntimeConfig,
    /// Live runs only; a handle is dropped once its outcome is published
    runs: Arc<DashMap<RunId, RunHandle>>,
}

impl WorkflowRuntime {
    pub fn new(registry: Registry, store: Arc<dyn HistoryStore>, config: RuntimeConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            dispatcher: ActivityDispatcher::new(config.max_concurrent_activities),
            config,
            runs: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn HistoryStore> {
        self.store.clone()
    }

    /// Runs executing in this runtime
    pub fn active_runs(&self) -> Vec<RunId> {
        self.runs.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Start a run of `W` and return its id without waiting for it
    #[instrument(skip(self, input), fields(workflow = W::NAME))]
    pub async fn submit<W: Workflow>(&self, input: W::Input) -> WorkflowResult<RunId> {
        let workflow = self.registry.workflow(W::NAME)?;
        let input = serde_json::to_value(&input).map_err(|e| WorkflowError::Input(e.to_string()))?;

        let run_id = RunId::generate();
        let started = self
            .store
            .append(
                &run_id,
                HistoryEvent::WorkflowStarted {
                    workflow: W::NAME.to_string(),
                    input: input.clone(),
                },
            )
            .await?;

        tracing::info!(run_id = %run_id, "Workflow run submitted");
        self.spawn_run(run_id.clone(), W::NAME.to_string(), workflow, input, vec![started]);
        Ok(run_id)
    }

    /// Wait for a run's terminal outcome
    pub async fn wait<W: Workflow>(&self, run_id: &RunId) -> WorkflowResult<W::Output> {
        let output = self.wait_raw(run_id).await?;
        serde_json::from_value(output).map_err(|e| {
            WorkflowError::Internal(format!("failed to decode {} output: {}", W::NAME, e))
        })
    }

    /// Wait for a run's terminal outcome as recorded JSON
    pub async fn wait_raw(&self, run_id: &RunId) -> WorkflowResult<Value> {
        let live = self.runs.get(run_id).map(|handle| handle.outcome.clone());

        if let Some(mut outcome) = live {
            let result = outcome
                .wait_for(Option::is_some)
                .await
                .map_err(|_| {
                    WorkflowError::Internal(format!("run {} stopped without an outcome", run_id))
                })?
                .clone();
            return result
                .unwrap_or_else(|| Err(WorkflowError::Internal("empty run outcome".to_string())));
        }

        match self.status(run_id).await? {
            RunStatus::Completed { output, .. } => Ok(output),
            RunStatus::Failed { error, .. } => Err(error),
            _ => Err(WorkflowError::Internal(format!(
                "run {} is incomplete and not executing; resume it first",
                run_id
            ))),
        }
    }

    /// Current status of a run, derived from its history
    pub async fn status(&self, run_id: &RunId) -> WorkflowResult<RunStatus> {
        let history = self.store.load(run_id).await?;
        if history.is_empty() {
            return Err(WorkflowError::RunNotFound(run_id.clone()));
        }
        Ok(RunStatus::from_history(&history))
    }

    /// Request cancellation; honored at the run's next phase boundary
    #[instrument(skip(self, run_id), fields(run_id = %run_id))]
    pub async fn cancel(&self, run_id: &RunId) -> WorkflowResult<()> {
        match self.status(run_id).await? {
            RunStatus::Running {
                cancel_requested: false,
                ..
            } => {
                self.store
                    .append(run_id, HistoryEvent::CancelRequested)
                    .await?;
                tracing::info!("Cancellation requested");
            }
            status => {
                tracing::debug!(?status, "Cancellation already requested or run finished");
            }
        }

        if let Some(handle) = self.runs.get(run_id) {
            handle.cancel.send_replace(true);
        }
        Ok(())
    }

    /// Re-spawn every stored run without a terminal event
    ///
    /// Completed activities are answered from history. Invocations that were
    /// scheduled but never finished are dispatched again.
    #[instrument(skip(self))]
    pub async fn resume_incomplete(&self) -> WorkflowResult<Vec<RunId>> {
        let mut resumed = Vec::new();

        for run_id in self.store.list_runs().await? {
            if self.runs.contains_key(&run_id) {
                continue;
            }

            let history = match self.store.load(&run_id).await {
                Ok(history) => history,
                Err(e) => {
                    tracing::warn!(run_id = %run_id, error = %e, "Skipping run with unreadable history");
                    continue;
                }
            };
            if history.iter().any(|record| record.event.is_terminal()) {
                continue;
            }

            let Some((name, input)) = history.iter().find_map(|record| match &record.event {
                HistoryEvent::WorkflowStarted { workflow, input } => {
                    Some((workflow.clone(), input.clone()))
                }
                _ => None,
            }) else {
                tracing::warn!(run_id = %run_id, "Skipping run without a start event");
                continue;
            };

            let workflow = match self.registry.workflow(&name) {
                Ok(workflow) => workflow,
                Err(e) => {
                    tracing::warn!(run_id = %run_id, workflow = %name, error = %e, "Skipping run of unknown workflow");
                    continue;
                }
            };

            tracing::info!(run_id = %run_id, workflow = %name, events = history.len(), "Resuming run");
            self.spawn_run(run_id.clone(), name, workflow, input, history);
            resumed.push(run_id);
        }

        Ok(resumed)
    }

    fn spawn_run(
        &self,
        run_id: RunId,
        name: String,
        workflow: Arc<dyn ErasedWorkflow>,
        input: Value,
        history: Vec<HistoryRecord>,
    ) {
        let cancel_requested = history
            .iter()
            .any(|record| matches!(record.event, HistoryEvent::CancelRequested));
        let (cancel_tx, cancel_rx) = watch::channel(cancel_requested);
        let (outcome_tx, outcome_rx) = watch::channel::<Outcome>(None);

        let mut ctx = WorkflowContext::new(
            run_id.clone(),
            self.store.clone(),
            self.registry.clone(),
            self.dispatcher.clone(),
            self.config.default_activity_options.clone(),
            cancel_rx,
            &history,
        );

        self.runs.insert(
            run_id.clone(),
            RunHandle {
                cancel: cancel_tx,
                outcome: outcome_rx,
            },
        );

        let store = self.store.clone();
        let runs = self.runs.clone();
        let span = tracing::info_span!("workflow_run", run_id = %run_id, workflow = %name);

        tokio::spawn(
            async move {
                let mut result = match AssertUnwindSafe(workflow.run_json(&mut ctx, input))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(WorkflowError::Internal("workflow panicked".to_string())),
                };

                let terminal = match &result {
                    Ok(output) => HistoryEvent::WorkflowCompleted {
                        output: output.clone(),
                    },
                    Err(error) => HistoryEvent::WorkflowFailed {
                        error: error.clone(),
                    },
                };

                if let Err(e) = store.append(&run_id, terminal).await {
                    tracing::error!(error = %e, "Failed to record run outcome");
                    result = Err(e.into());
                }

                match &result {
                    Ok(_) => tracing::info!("Workflow run completed"),
                    Err(error) => tracing::warn!(error = %error, "Workflow run failed"),
                }

                outcome_tx.send_replace(Some(result));
                runs.remove(&run_id);
            }
            .instrument(span),
        );
    }
}
