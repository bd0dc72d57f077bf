use thiserror::Error;

/// Errors that can occur while building or decoding a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A crontab expression or structured pattern is malformed or out of range.
    #[error("Invalid cron pattern: {0}")]
    InvalidCron(String),

    /// A stored pattern could not be encoded or decoded.
    #[error("Cron pattern encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
