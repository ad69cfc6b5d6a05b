//! Activity dispatcher
//!
//! Runs activity invocations on a bounded worker pool. Each attempt first has
//! to obtain a worker slot within the schedule-to-start timeout, then has to
//! finish within the start-to-close timeout. A retry policy repeats failed
//! attempts; input and payload errors are never repeated.

use crate::activity::Activity;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use workflow_types::{ActivityError, ActivityOptions, RetryPolicy, TimeoutKind};

/// Default size of the worker pool
pub const DEFAULT_MAX_CONCURRENT_ACTIVITIES: usize = 32;

/// Bounded pool that executes activity invocations
#[derive(Clone, Debug)]
pub struct ActivityDispatcher {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl ActivityDispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Worker slots not held by a running invocation
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run one invocation to its final outcome, retrying as the policy allows
    pub async fn dispatch<A: Activity>(
        &self,
        activity: Arc<A>,
        input: A::Input,
        options: &ActivityOptions,
        retry: Option<&RetryPolicy>,
    ) -> Result<A::Output, ActivityError> {
        let mut attempt = 1u32;

        loop {
            let error = match self.attempt::<A>(activity.as_ref(), input.clone(), options).await {
                Ok(output) => return Ok(output),
                Err(error) => error,
            };

            let policy = match retry {
                Some(policy) if error.is_retryable() && policy.allows_attempt_after(attempt) => {
                    policy
                }
                _ => return Err(error),
            };

            let delay = policy.delay_after(attempt);
            tracing::warn!(
                activity = A::NAME,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Activity attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt<A: Activity>(
        &self,
        activity: &A,
        input: A::Input,
        options: &ActivityOptions,
    ) -> Result<A::Output, ActivityError> {
        let permit = match tokio::time::timeout(
            options.schedule_to_start_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(ActivityError::RemoteOperation(
                    "worker pool is closed".to_string(),
                ))
            }
            Err(_) => {
                return Err(ActivityError::Timeout {
                    kind: TimeoutKind::Dispatch,
                    after: options.schedule_to_start_timeout,
                })
            }
        };

        tracing::debug!(activity = A::NAME, "Activity started");

        let execution = AssertUnwindSafe(activity.execute(input)).catch_unwind();
        let result = match tokio::time::timeout(options.start_to_close_timeout, execution).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ActivityError::RemoteOperation(format!(
                "activity panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => Err(ActivityError::Timeout {
                kind: TimeoutKind::Execution,
                after: options.start_to_close_timeout,
            }),
        };

        drop(permit);
        result
    }
}

impl Default for ActivityDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_ACTIVITIES)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Flaky {
        calls: AtomicU32,
        error: Option<ActivityError>,
        sleep: Option<Duration>,
        panics: bool,
    }

    #[async_trait]
    impl Activity for Flaky {
        const NAME: &'static str = "flaky";
        type Input = u32;
        type Output = u32;

        async fn execute(&self, input: u32) -> Result<u32, ActivityError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(sleep) = self.sleep {
                tokio::time::sleep(sleep).await;
            }
            if self.panics {
                panic!("lost the cloud session");
            }
            match &self.error {
                Some(error) => Err(error.clone()),
                None => Ok(input * 2),
            }
        }
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            maximum_attempts: attempts,
            initial_interval: Duration::from_millis(1),
            backoff_coefficient: 1.0,
            maximum_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let dispatcher = ActivityDispatcher::new(4);
        let output = dispatcher
            .dispatch(Arc::new(Flaky::default()), 21, &ActivityOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(output, 42);
        assert_eq!(dispatcher.available_slots(), 4);
    }

    #[tokio::test]
    async fn test_retry_runs_every_attempt() {
        let activity = Arc::new(Flaky {
            error: Some(ActivityError::RemoteOperation("503".into())),
            ..Default::default()
        });
        let dispatcher = ActivityDispatcher::default();
        let retry = fast_retry(3);

        let err = dispatcher
            .dispatch(activity.clone(), 1, &ActivityOptions::default(), Some(&retry))
            .await
            .unwrap_err();

        assert_eq!(err, ActivityError::RemoteOperation("503".into()));
        assert_eq!(activity.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_input_is_not_retried() {
        let activity = Arc::new(Flaky {
            error: Some(ActivityError::InvalidInput("bad".into())),
            ..Default::default()
        });
        let retry = fast_retry(5);

        ActivityDispatcher::default()
            .dispatch(activity.clone(), 1, &ActivityOptions::default(), Some(&retry))
            .await
            .unwrap_err();

        assert_eq!(activity.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execution_timeout() {
        let activity = Arc::new(Flaky {
            sleep: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let options =
            ActivityOptions::default().with_start_to_close_timeout(Duration::from_millis(20));

        let err = ActivityDispatcher::default()
            .dispatch(activity, 1, &options, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ActivityError::Timeout {
                kind: TimeoutKind::Execution,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dispatch_timeout_when_pool_is_busy() {
        let dispatcher = ActivityDispatcher::new(1);
        let slow = Arc::new(Flaky {
            sleep: Some(Duration::from_millis(500)),
            ..Default::default()
        });

        let busy = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(slow, 1, &ActivityOptions::default(), None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let options =
            ActivityOptions::default().with_schedule_to_start_timeout(Duration::from_millis(20));
        let err = dispatcher
            .dispatch(Arc::new(Flaky::default()), 1, &options, None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ActivityError::Timeout {
                kind: TimeoutKind::Dispatch,
                after: Duration::from_millis(20),
            }
        );
        assert_eq!(busy.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_remote_operation_failure() {
        let activity = Arc::new(Flaky {
            panics: true,
            ..Default::default()
        });
        let dispatcher = ActivityDispatcher::new(2);

        let err = dispatcher
            .dispatch(activity, 1, &ActivityOptions::default(), None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ActivityError::RemoteOperation("activity panicked: lost the cloud session".into())
        );
        assert_eq!(dispatcher.available_slots(), 2);
    }
}
