//! Configuration for pke-worker

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use workflow_engine::{RuntimeConfig, DEFAULT_MAX_CONCURRENT_ACTIVITIES};
use workflow_types::{ActivityOptions, RetryPolicy};

/// Main worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Where run histories are kept
    #[serde(default)]
    pub history: HistoryConfig,

    /// Activity execution limits
    #[serde(default)]
    pub activities: ActivityConfig,

    /// Organization secrets
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// History store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HistoryConfig {
    /// Histories live as long as the process; nothing can be resumed
    Memory,

    /// One JSON-lines file per run
    File {
        /// Directory holding the history files
        #[serde(default = "default_history_dir")]
        dir: PathBuf,
    },
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig::File {
            dir: default_history_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    /// Size of the shared activity worker pool
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum wait for a free worker slot, in seconds
    #[serde(default = "default_schedule_to_start_timeout")]
    pub schedule_to_start_timeout_secs: u64,

    /// Maximum duration of a single attempt, in seconds
    #[serde(default = "default_start_to_close_timeout")]
    pub start_to_close_timeout_secs: u64,

    /// Total attempts per invocation; 0 or 1 disables retries
    #[serde(default)]
    pub retry_maximum_attempts: u32,

    /// Delay before the first retry, in seconds
    #[serde(default = "default_retry_initial_interval")]
    pub retry_initial_interval_secs: u64,

    /// Upper bound for a single retry delay, in seconds
    #[serde(default = "default_retry_maximum_interval")]
    pub retry_maximum_interval_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_ACTIVITIES,
            schedule_to_start_timeout_secs: default_schedule_to_start_timeout(),
            start_to_close_timeout_secs: default_start_to_close_timeout(),
            retry_maximum_attempts: 0,
            retry_initial_interval_secs: default_retry_initial_interval(),
            retry_maximum_interval_secs: default_retry_maximum_interval(),
        }
    }
}

impl ActivityConfig {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            default_activity_options: ActivityOptions::default()
                .with_schedule_to_start_timeout(Duration::from_secs(
                    self.schedule_to_start_timeout_secs,
                ))
                .with_start_to_close_timeout(Duration::from_secs(self.start_to_close_timeout_secs)),
            max_concurrent_activities: self.max_concurrent,
        }
    }

    /// Retry policy for the PKE activities, `None` when retries are off
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        if self.retry_maximum_attempts <= 1 {
            return None;
        }

        Some(RetryPolicy {
            maximum_attempts: self.retry_maximum_attempts,
            initial_interval: Duration::from_secs(self.retry_initial_interval_secs),
            maximum_interval: Duration::from_secs(self.retry_maximum_interval_secs),
            ..RetryPolicy::default()
        })
    }
}

/// Secret store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// JSON file with a list of organization secret records
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_history_dir() -> PathBuf {
    PathBuf::from("var/history")
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_ACTIVITIES
}

fn default_schedule_to_start_timeout() -> u64 {
    5 * 60
}

fn default_start_to_close_timeout() -> u64 {
    20 * 60
}

fn default_retry_initial_interval() -> u64 {
    1
}

fn default_retry_maximum_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WorkerConfig {
    /// Load configuration from defaults, an optional file and `PKE_` variables
    ///
    /// Nested keys use a double underscore, e.g.
    /// `PKE_ACTIVITIES__MAX_CONCURRENT=8`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&WorkerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("PKE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
