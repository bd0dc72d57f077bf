use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Environment variable set on every spawned worker process.
///
/// The host start hook checks it so a worker that loads the host's code never
/// launches a second supervisor.
pub const WORKER_PROCESS_ENV: &str = "AUTOTASK_WORKER_PROCESS";

/// Default subcommand passed to a re-executed worker binary.
pub const DEFAULT_WORKER_ARG: &str = "worker";

/// Top-level config (autotask.toml + AUTOTASK_* env overrides).
///
/// Every component takes the section it needs by reference at construction;
/// nothing reads configuration from a global.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutotaskConfig {
    /// When false the host start hook never launches a supervisor.
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long SQLite waits on a locked database before returning BUSY.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Settings for the worker processes and their task-handler loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker processes the supervisor keeps alive.
    #[serde(default = "default_worker_count")]
    pub count: usize,
    /// Program to spawn for a worker. `None` re-executes the current binary.
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Wait between two claim attempts when the queue is empty.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
    /// Delay before a failed one-shot task with retries left runs again.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            executable: None,
            args: default_worker_args(),
            working_dir: None,
            idle_interval_ms: default_idle_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Settings for the leader process: pool monitoring and queue cleaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_clean_interval_ms")]
    pub clean_interval_ms: u64,
    /// Time a worker gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_ms: default_monitor_interval_ms(),
            clean_interval_ms: default_clean_interval_ms(),
            terminate_grace_ms: default_terminate_grace_ms(),
        }
    }
}

impl SupervisorConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_millis(self.clean_interval_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.autotask/autotask.db", home)
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}
fn default_worker_count() -> usize {
    1
}
fn default_worker_args() -> Vec<String> {
    vec![DEFAULT_WORKER_ARG.to_string()]
}
fn default_idle_interval_ms() -> u64 {
    10_000
}
fn default_retry_delay_ms() -> u64 {
    2_000
}
fn default_monitor_interval_ms() -> u64 {
    5_000
}
fn default_clean_interval_ms() -> u64 {
    600_000
}
fn default_terminate_grace_ms() -> u64 {
    5_000
}

impl AutotaskConfig {
    /// Load config from a TOML file with AUTOTASK_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.autotask/autotask.toml
    ///
    /// Nested keys use a double underscore, e.g.
    /// `AUTOTASK_WORKER__IDLE_INTERVAL_MS=500`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AutotaskConfig = Figment::from(Serialized::defaults(AutotaskConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AUTOTASK_").split("__"))
            .extract()
            .map_err(|e| crate::error::AutotaskError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.autotask/autotask.toml", home)
}
