use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Store error: {0}")]
    Store(#[from] autotask_store::StoreError),

    #[error("Config error: {0}")]
    Config(#[from] autotask_core::AutotaskError),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
