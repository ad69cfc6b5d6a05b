//! Workflow context: phases, fan-out/fan-in and replay
//!
//! The context is the workflow's only window onto the outside world. Every
//! decision it hands back is either recorded in history or answered from it:
//!
//! - [`WorkflowContext::enter_phase`] marks a phase boundary. Cancellation,
//!   whether signalled in-process or recorded in history, is observed here
//!   and nowhere else.
//! - [`WorkflowContext::execute_all`] fans a batch of activity invocations out
//!   on the dispatcher and waits for every one of them. Invocations already
//!   recorded as finished are answered from history instead of running again.
//!
//! Sequence numbers are handed out in submission order, so a re-executed
//! workflow that schedules the same activities in the same order lines up
//! with its recorded history.

use crate::activity::Activity;
use crate::dispatcher::ActivityDispatcher;
use crate::registry::Registry;
use crate::store::HistoryStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use workflow_types::{
    ActivityError, ActivityFailure, ActivityOptions, CompositeError, HistoryEvent, HistoryRecord,
    RunId, WorkflowError, WorkflowResult,
};

/// What a previous execution of this run already recorded
#[derive(Debug, Default)]
struct Replay {
    phases: Vec<String>,
    scheduled: HashMap<u64, (String, String)>,
    outcomes: HashMap<u64, Result<Value, ActivityFailure>>,
}

impl Replay {
    fn from_history(history: &[HistoryRecord]) -> Self {
        let mut replay = Replay::default();

        for record in history {
            match &record.event {
                HistoryEvent::PhaseStarted { phase, .. } => replay.phases.push(phase.clone()),
                HistoryEvent::ActivityScheduled {
                    seq,
                    activity,
                    target,
                } => {
                    replay
                        .scheduled
                        .insert(*seq, (activity.clone(), target.clone()));
                }
                HistoryEvent::ActivityCompleted { seq, output } => {
                    replay.outcomes.insert(*seq, Ok(output.clone()));
                }
                HistoryEvent::ActivityFailed { seq, failure } => {
                    replay.outcomes.insert(*seq, Err(failure.clone()));
                }
                _ => {}
            }
        }

        replay
    }
}

/// Execution context handed to [`Workflow::run`](crate::Workflow::run)
pub struct WorkflowContext {
    run_id: RunId,
    store: Arc<dyn HistoryStore>,
    registry: Arc<Registry>,
    dispatcher: ActivityDispatcher,
    options: ActivityOptions,
    cancel: watch::Receiver<bool>,
    replay: Replay,
    next_seq: u64,
    next_phase: u64,
    phase: Option<String>,
}

impl WorkflowContext {
    pub(crate) fn new(
        run_id: RunId,
        store: Arc<dyn HistoryStore>,
        registry: Arc<Registry>,
        dispatcher: ActivityDispatcher,
        options: ActivityOptions,
        cancel: watch::Receiver<bool>,
        history: &[HistoryRecord],
    ) -> Self {
        Self {
            run_id,
            store,
            registry,
            dispatcher,
            options,
            cancel,
            replay: Replay::from_history(history),
            next_seq: 0,
            next_phase: 0,
            phase: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Name of the phase currently executing
    pub fn current_phase(&self) -> Option<&str> {
        self.phase.as_deref()
    }

    pub fn activity_options(&self) -> &ActivityOptions {
        &self.options
    }

    /// Options for every activity scheduled after this call
    pub fn set_activity_options(&mut self, options: ActivityOptions) {
        self.options = options;
    }

    /// Whether cancellation has been signalled to this run in-process
    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Cross a phase boundary
    ///
    /// A phase already started by a previous execution is only checked
    /// against its recorded name. A new phase fails with
    /// [`WorkflowError::Canceled`] if cancellation was signalled in-process or
    /// recorded in history, otherwise it is recorded and entered.
    pub async fn enter_phase(&mut self, name: &str) -> WorkflowResult<()> {
        let index = self.next_phase;
        self.next_phase += 1;

        if let Some(recorded) = self.replay.phases.get(index as usize) {
            if recorded != name {
                return Err(WorkflowError::Nondeterminism(format!(
                    "phase {} was '{}' in history but the workflow entered '{}'",
                    index, recorded, name
                )));
            }
            tracing::debug!(run_id = %self.run_id, phase = name, index, "Replaying phase");
            self.phase = Some(name.to_string());
            return Ok(());
        }

        if self.is_cancel_requested() || self.cancel_recorded().await? {
            tracing::info!(run_id = %self.run_id, phase = name, "Cancellation honored at phase boundary");
            return Err(WorkflowError::Canceled {
                phase: name.to_string(),
            });
        }

        self.record(HistoryEvent::PhaseStarted {
            index,
            phase: name.to_string(),
        })
        .await?;
        self.phase = Some(name.to_string());

        tracing::info!(run_id = %self.run_id, phase = name, index, "Phase started");
        Ok(())
    }

    /// Run every input as a concurrent invocation of `A` and wait for all of them
    ///
    /// Returns one slot per input, in input order. Failed invocations never
    /// stop their siblings.
    pub async fn execute_all<A: Activity>(
        &mut self,
        inputs: Vec<A::Input>,
    ) -> WorkflowResult<Vec<Result<A::Output, ActivityFailure>>> {
        let handle = self.registry.activity::<A>()?;

        let mut slots: Vec<Option<Result<A::Output, ActivityFailure>>> =
            (0..inputs.len()).map(|_| None).collect();
        let mut targets = Vec::with_capacity(inputs.len());
        let mut tasks = JoinSet::new();

        for (slot, input) in inputs.into_iter().enumerate() {
            let seq = self.next_seq;
            self.next_seq += 1;

            let target = handle.activity.target(&input);
            targets.push(target.clone());

            let already_scheduled = match self.replay.scheduled.get(&seq) {
                Some((activity, recorded_target)) => {
                    if activity != A::NAME || *recorded_target != target {
                        return Err(WorkflowError::Nondeterminism(format!(
                            "activity {} was {} '{}' in history but the workflow scheduled {} '{}'",
                            seq, activity, recorded_target, A::NAME, target
                        )));
                    }
                    true
                }
                None => false,
            };

            if let Some(outcome) = self.replay.outcomes.get(&seq) {
                tracing::debug!(
                    run_id = %self.run_id,
                    activity = A::NAME,
                    target = %target,
                    seq,
                    "Activity outcome replayed from history"
                );
                slots[slot] = Some(decode_outcome::<A>(outcome.clone(), &target));
                continue;
            }

            if !already_scheduled {
                self.record(HistoryEvent::ActivityScheduled {
                    seq,
                    activity: A::NAME.to_string(),
                    target: target.clone(),
                })
                .await?;
            }

            tracing::debug!(run_id = %self.run_id, activity = A::NAME, target = %target, seq, "Activity scheduled");

            let dispatcher = self.dispatcher.clone();
            let activity = handle.activity.clone();
            let retry = handle.retry.clone();
            let options = self.options.clone();
            tasks.spawn(async move {
                let result = dispatcher
                    .dispatch(activity, input, &options, retry.as_ref())
                    .await;
                (slot, seq, result)
            });
        }

        // Every spawned invocation is joined before returning, including
        // after a failed history write.
        let mut first_error: Option<WorkflowError> = None;

        while let Some(joined) = tasks.join_next().await {
            let (slot, seq, result) = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    first_error.get_or_insert_with(|| {
                        WorkflowError::Internal(format!("activity task of {} was lost: {}", A::NAME, e))
                    });
                    continue;
                }
            };
            let target = targets[slot].clone();

            let outcome = match result.and_then(|output| encode_output(&output).map(|v| (output, v))) {
                Ok((output, value)) => {
                    if let Err(e) = self
                        .record(HistoryEvent::ActivityCompleted { seq, output: value })
                        .await
                    {
                        first_error.get_or_insert(e);
                    }
                    tracing::debug!(run_id = %self.run_id, activity = A::NAME, target = %target, seq, "Activity completed");
                    Ok(output)
                }
                Err(error) => {
                    let failure = ActivityFailure::new(A::NAME, target, error);
                    if let Err(e) = self
                        .record(HistoryEvent::ActivityFailed {
                            seq,
                            failure: failure.clone(),
                        })
                        .await
                    {
                        first_error.get_or_insert(e);
                    }
                    tracing::warn!(run_id = %self.run_id, seq, error = %failure, "Activity failed");
                    Err(failure)
                }
            };

            slots[slot] = Some(outcome);
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| {
                    WorkflowError::Internal(format!("missing result slot for {}", A::NAME))
                })
            })
            .collect()
    }

    /// Run a single invocation of `A`
    ///
    /// A failure is reported as a composite of that one failure.
    pub async fn execute_activity<A: Activity>(
        &mut self,
        input: A::Input,
    ) -> WorkflowResult<A::Output> {
        let mut results = self.execute_all::<A>(vec![input]).await?;
        match results.pop() {
            Some(Ok(output)) => Ok(output),
            Some(Err(failure)) => Err(CompositeError::from_failures(vec![failure])
                .map(WorkflowError::Composite)
                .unwrap_or_else(|| WorkflowError::Internal("empty failure set".to_string()))),
            None => Err(WorkflowError::Internal(format!(
                "no result for {}",
                A::NAME
            ))),
        }
    }

    /// Cancellation may have been recorded by another process sharing the store
    async fn cancel_recorded(&self) -> WorkflowResult<bool> {
        let history = self.store.load(&self.run_id).await?;
        Ok(history
            .iter()
            .any(|record| matches!(record.event, HistoryEvent::CancelRequested)))
    }

    async fn record(&self, event: HistoryEvent) -> WorkflowResult<HistoryRecord> {
        Ok(self.store.append(&self.run_id, event).await?)
    }
}

fn encode_output<T: serde::Serialize>(output: &T) -> Result<Value, ActivityError> {
    serde_json::to_value(output).map_err(|e| ActivityError::Payload(e.to_string()))
}

fn decode_outcome<A: Activity>(
    outcome: Result<Value, ActivityFailure>,
    target: &str,
) -> Result<A::Output, ActivityFailure> {
    let value = outcome?;
    serde_json::from_value(value).map_err(|e| {
        ActivityFailure::new(A::NAME, target, ActivityError::Payload(e.to_string()))
    })
}
