//! Workflow contract and its type-erased form

use crate::context::WorkflowContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use workflow_types::{WorkflowError, WorkflowResult};

/// A deterministic orchestration procedure
///
/// `run` may only branch on its input and on what the context returns. It is
/// re-executed from the top whenever a run is resumed, so any side effect
/// belongs in an [`Activity`](crate::Activity).
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Stable registration name, recorded in history
    const NAME: &'static str;

    /// Names of every activity this workflow may schedule
    const ACTIVITIES: &'static [&'static str];

    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        input: Self::Input,
    ) -> WorkflowResult<Self::Output>;
}

/// JSON-in, JSON-out view of a [`Workflow`] so runs can be resumed by name
#[async_trait]
pub(crate) trait ErasedWorkflow: Send + Sync {
    async fn run_json(&self, ctx: &mut WorkflowContext, input: Value) -> WorkflowResult<Value>;
}

pub(crate) struct TypedWorkflow<W>(pub W);

#[async_trait]
impl<W: Workflow> ErasedWorkflow for TypedWorkflow<W> {
    async fn run_json(&self, ctx: &mut WorkflowContext, input: Value) -> WorkflowResult<Value> {
        let input: W::Input =
            serde_json::from_value(input).map_err(|e| WorkflowError::Input(e.to_string()))?;

        let output = self.0.run(ctx, input).await?;

        serde_json::to_value(output).map_err(|e| {
            WorkflowError::Internal(format!("failed to encode {} output: {}", W::NAME, e))
        })
    }
}
