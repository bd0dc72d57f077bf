use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Store error: {0}")]
    Store(#[from] autotask_store::StoreError),

    #[error("Config error: {0}")]
    Config(#[from] autotask_core::AutotaskError),

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("No tokio runtime available to host the supervisor")]
    NoRuntime,

    #[error("Supervisor task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
