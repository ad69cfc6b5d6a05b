//! PKE Worker - runs PKE infrastructure workflows
//!
//! - `teardown` deletes an Azure PKE cluster's infrastructure
//! - `resume` continues runs a previous worker left unfinished
//! - `status` / `cancel` inspect and stop recorded runs
//! - `proxy` assembles HTTP(S) proxy settings from organization secrets

use anyhow::Context;
use clap::{Parser, Subcommand};
use pke_workflow::proxy::{
    AssembleHttpProxySettingsActivity, HttpProxySettingsInput, InMemoryPasswordSecretStore,
    SecretRecord,
};
use pke_workflow::workflows::DeleteAzureInfrastructureWorkflowInput;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workflow_engine::Activity;
use workflow_types::RunId;

mod config;
mod deleter;
mod worker;

use config::WorkerConfig;
use worker::Worker;

/// PKE Worker CLI
#[derive(Parser)]
#[command(name = "pke-worker")]
#[command(about = "PKE Worker - durable infrastructure workflows", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PKE_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "PKE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "PKE_LOG_JSON")]
    json: bool,

    /// Secret records file, overrides the configured one
    #[arg(long, env = "PKE_SECRETS_FILE", global = true)]
    secrets: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Delete a cluster's Azure infrastructure
    Teardown {
        /// Teardown input as JSON
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Resume every run without a terminal event
    Resume,

    /// Print the recorded status of a run
    Status {
        run_id: String,
    },

    /// Request cancellation of a run
    Cancel {
        run_id: String,
    },

    /// Assemble HTTP(S) proxy settings and print them as JSON
    Proxy {
        /// Proxy settings input as JSON
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = WorkerConfig::load(cli.config.as_deref()).context("invalid configuration")?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if cli.secrets.is_some() {
        config.secrets.file = cli.secrets;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let secrets = Arc::new(load_secrets(config.secrets.file.as_deref())?);

    match cli.command {
        Command::Teardown { input } => {
            let input: DeleteAzureInfrastructureWorkflowInput = read_json(&input)?;
            let worker = Worker::build(&config, secrets).await?;
            let run_id = worker.teardown(input).await?;
            println!("{}", run_id);
        }
        Command::Resume => {
            let worker = Worker::build(&config, secrets).await?;
            for run_id in worker.resume().await? {
                println!("{}", run_id);
            }
        }
        Command::Status { run_id } => {
            let worker = Worker::build(&config, secrets).await?;
            let status = worker.status(&RunId::new(run_id)).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Cancel { run_id } => {
            let worker = Worker::build(&config, secrets).await?;
            worker.cancel(&RunId::new(run_id)).await?;
        }
        Command::Proxy { input } => {
            let input: HttpProxySettingsInput = read_json(&input)?;
            let output = AssembleHttpProxySettingsActivity::new(secrets)
                .execute(input)
                .await
                .context("failed to assemble proxy settings")?;
            println!("{}", serde_json::to_string_pretty(&output.settings)?);
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_secrets(path: Option<&Path>) -> anyhow::Result<InMemoryPasswordSecretStore> {
    let Some(path) = path else {
        return Ok(InMemoryPasswordSecretStore::new());
    };

    let records: Vec<SecretRecord> = read_json(path)?;
    tracing::info!(path = %path.display(), secrets = records.len(), "Loaded secret records");
    Ok(InMemoryPasswordSecretStore::from_records(records))
}
