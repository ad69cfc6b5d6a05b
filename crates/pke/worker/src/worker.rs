//! Worker assembly: history store, registry and runtime

use crate::config::{HistoryConfig, WorkerConfig};
use crate::deleter::DryRunResourceDeleter;
use anyhow::{bail, Context};
use pke_workflow::proxy::PasswordSecretStore;
use pke_workflow::workflows::{DeleteAzureInfrastructureWorkflowInput, DeleteInfrastructureWorkflow};
use pke_workflow::PkeDependencies;
use std::sync::Arc;
use workflow_engine::{
    FileHistoryStore, HistoryStore, InMemoryHistoryStore, Registry, WorkflowRuntime,
};
use workflow_types::{RunId, RunStatus, WorkflowError};

pub struct Worker {
    runtime: WorkflowRuntime,
}

impl Worker {
    /// Open the history store and validate every registration
    pub async fn build(
        config: &WorkerConfig,
        secrets: Arc<dyn PasswordSecretStore>,
    ) -> anyhow::Result<Self> {
        let store: Arc<dyn HistoryStore> = match &config.history {
            HistoryConfig::Memory => Arc::new(InMemoryHistoryStore::new()),
            HistoryConfig::File { dir } => Arc::new(
                FileHistoryStore::open(dir.clone())
                    .await
                    .with_context(|| format!("failed to open history at {}", dir.display()))?,
            ),
        };

        let mut builder = Registry::builder();
        pke_workflow::register(
            &mut builder,
            PkeDependencies {
                deleter: Arc::new(DryRunResourceDeleter),
                secrets,
                retry: config.activities.retry_policy(),
            },
        )
        .context("failed to register PKE workflows")?;
        let registry = builder.build().context("workflow registration is incomplete")?;

        tracing::info!(
            workflows = ?registry.workflow_names(),
            activities = registry.activity_names().len(),
            "Registry validated"
        );

        Ok(Self {
            runtime: WorkflowRuntime::new(registry, store, config.activities.runtime_config()),
        })
    }

    pub fn runtime(&self) -> &WorkflowRuntime {
        &self.runtime
    }

    /// Run a teardown to its end; an interrupt requests cancellation
    pub async fn teardown(&self, input: DeleteAzureInfrastructureWorkflowInput) -> anyhow::Result<RunId> {
        let cluster = input.cluster_name.clone();
        let run_id = self
            .runtime
            .submit::<DeleteInfrastructureWorkflow>(input)
            .await
            .context("failed to start teardown")?;
        tracing::info!(run_id = %run_id, cluster = %cluster, "Teardown started");

        self.finish(&run_id).await?;
        Ok(run_id)
    }

    /// Resume every incomplete run and wait for all of them
    pub async fn resume(&self) -> anyhow::Result<Vec<RunId>> {
        let resumed = self
            .runtime
            .resume_incomplete()
            .await
            .context("failed to resume runs")?;
        tracing::info!(runs = resumed.len(), "Resumed incomplete runs");

        let mut failed = 0;
        for run_id in &resumed {
            if let Err(e) = self.finish(run_id).await {
                tracing::error!(run_id = %run_id, error = %e, "Resumed run failed");
                failed += 1;
            }
        }

        if failed > 0 {
            bail!("{} of {} resumed runs failed", failed, resumed.len());
        }
        Ok(resumed)
    }

    pub async fn status(&self, run_id: &RunId) -> anyhow::Result<RunStatus> {
        Ok(self.runtime.status(run_id).await?)
    }

    pub async fn cancel(&self, run_id: &RunId) -> anyhow::Result<()> {
        Ok(self.runtime.cancel(run_id).await?)
    }

    async fn finish(&self, run_id: &RunId) -> anyhow::Result<()> {
        let outcome = tokio::select! {
            outcome = self.runtime.wait_raw(run_id) => outcome,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(run_id = %run_id, "Interrupted; canceling at the next phase boundary");
                self.runtime.cancel(run_id).await?;
                self.runtime.wait_raw(run_id).await
            }
        };

        match outcome {
            Ok(_) => {
                tracing::info!(run_id = %run_id, "Run completed");
                Ok(())
            }
            Err(error) => {
                report_failure(run_id, &error);
                Err(error).with_context(|| format!("run {} failed", run_id))
            }
        }
    }
}

fn report_failure(run_id: &RunId, error: &WorkflowError) {
    let failures = error.failures();
    if failures.is_empty() {
        tracing::error!(run_id = %run_id, error = %error, "Run failed");
        return;
    }

    for failure in failures {
        tracing::error!(
            run_id = %run_id,
            activity = %failure.activity,
            target = %failure.target,
            error = %failure.error,
            "Activity failed"
        );
    }
}
