use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Module name of the reserved leader-marker entry.
pub const MARKER_MODULE: &str = "autotask.supervisor";
/// Function name of the reserved leader-marker entry.
pub const MARKER_FUNCTION: &str = "leader_marker";

/// Lifecycle state of a task entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Eligible for claiming once `scheduled_at` has passed.
    Waiting,
    /// Claimed by exactly one worker.
    Running,
    /// One-shot entry finished successfully.
    Done,
    /// One-shot entry out of retries, or a cron entry with a corrupt pattern.
    Error,
    /// Reserved status of the leader marker; never claimed.
    SupervisorActive,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
            TaskStatus::SupervisorActive => "supervisor_active",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(TaskStatus::Waiting),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            "supervisor_active" => Ok(TaskStatus::SupervisorActive),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A persisted task entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEntry {
    /// UUIDv7 string, primary key.
    pub id: String,
    /// SQLite rowid; insertion order, breaks ties between equal `scheduled_at`.
    pub seq: i64,
    /// Earliest time the entry may be claimed.
    pub scheduled_at: DateTime<Utc>,
    pub module: String,
    pub function: String,
    /// JSON-encoded positional and keyword arguments.
    pub arguments: Vec<u8>,
    pub is_periodic: bool,
    /// Re-run interval of a fixed-interval entry.
    pub interval: Option<TimeDelta>,
    /// JSON-encoded `CronPattern` of a cron entry.
    pub cron_pattern: Option<Vec<u8>>,
    pub status: TaskStatus,
    /// One-shot retry budget; only ever decremented.
    pub retries: u32,
    /// JSON-encoded return value of the last successful run.
    pub result: Option<Vec<u8>>,
    /// Last failure description; empty after a success.
    pub error_message: String,
    /// Retention of a finished one-shot entry.
    pub ttl: TimeDelta,
    /// Deletion deadline, set when a one-shot entry reaches DONE or ERROR.
    pub expire_at: Option<DateTime<Utc>>,
}

impl TaskEntry {
    pub fn is_cron(&self) -> bool {
        self.cron_pattern.is_some()
    }

    pub fn is_leader_marker(&self) -> bool {
        self.status == TaskStatus::SupervisorActive
    }

    /// Label for listings: `module.function`.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.module, self.function)
    }
}

/// An entry that has not been stored yet. [`crate::TaskStore::create`] assigns
/// the identifier and returns the stored [`TaskEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub scheduled_at: DateTime<Utc>,
    pub module: String,
    pub function: String,
    pub arguments: Vec<u8>,
    pub is_periodic: bool,
    pub interval: Option<TimeDelta>,
    pub cron_pattern: Option<Vec<u8>>,
    pub status: TaskStatus,
    pub retries: u32,
    pub ttl: TimeDelta,
}

impl NewTask {
    /// A one-shot entry run once at `scheduled_at`, retried up to `retries` times.
    pub fn one_shot(
        module: impl Into<String>,
        function: impl Into<String>,
        arguments: Vec<u8>,
        scheduled_at: DateTime<Utc>,
        retries: u32,
        ttl: TimeDelta,
    ) -> Self {
        Self {
            scheduled_at,
            module: module.into(),
            function: function.into(),
            arguments,
            is_periodic: false,
            interval: None,
            cron_pattern: None,
            status: TaskStatus::Waiting,
            retries,
            ttl,
        }
    }

    /// A fixed-interval entry first run at `scheduled_at`.
    pub fn periodic(
        module: impl Into<String>,
        function: impl Into<String>,
        arguments: Vec<u8>,
        scheduled_at: DateTime<Utc>,
        interval: TimeDelta,
    ) -> Self {
        Self {
            scheduled_at,
            module: module.into(),
            function: function.into(),
            arguments,
            is_periodic: true,
            interval: Some(interval),
            cron_pattern: None,
            status: TaskStatus::Waiting,
            retries: 0,
            ttl: TimeDelta::zero(),
        }
    }

    /// A cron entry carrying an encoded pattern, first run at `scheduled_at`.
    pub fn cron(
        module: impl Into<String>,
        function: impl Into<String>,
        arguments: Vec<u8>,
        scheduled_at: DateTime<Utc>,
        cron_pattern: Vec<u8>,
    ) -> Self {
        Self {
            scheduled_at,
            module: module.into(),
            function: function.into(),
            arguments,
            is_periodic: true,
            interval: None,
            cron_pattern: Some(cron_pattern),
            status: TaskStatus::Waiting,
            retries: 0,
            ttl: TimeDelta::zero(),
        }
    }

    /// The reserved row whose presence means a supervisor is active.
    ///
    /// Periodic so that the leader's shutdown sweep removes it.
    pub fn leader_marker(now: DateTime<Utc>) -> Self {
        Self {
            scheduled_at: now,
            module: MARKER_MODULE.to_string(),
            function: MARKER_FUNCTION.to_string(),
            arguments: Vec::new(),
            is_periodic: true,
            interval: None,
            cron_pattern: None,
            status: TaskStatus::SupervisorActive,
            retries: 0,
            ttl: TimeDelta::zero(),
        }
    }
}
