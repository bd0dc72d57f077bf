use thiserror::Error;

/// Errors that can occur within the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A timestamp or duration could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(#[from] autotask_core::AutotaskError),

    /// No entry with the given ID exists in the store.
    #[error("Task not found: {id}")]
    NotFound { id: String },

    /// I/O failure while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for SQLite BUSY/LOCKED: another connection holds the write lock.
    ///
    /// Callers treat this as "lost the race", never as a failure.
    pub fn is_contention(&self) -> bool {
        match self {
            StoreError::Database(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
