use thiserror::Error;

/// Errors raised while registering tasks or reading them back.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Store error: {0}")]
    Store(#[from] autotask_store::StoreError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] autotask_schedule::ScheduleError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A duration option could not be represented (e.g. overflow).
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A callable asked for an argument the caller did not supply.
    #[error("Missing argument: {0}")]
    MissingArgument(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
