use std::sync::Arc;

use autotask_store::{TaskEntry, TaskStatus, TaskStore};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Result;

/// Caller-side view of one entry. Holds only the id; every accessor re-reads
/// the row.
#[derive(Clone)]
pub struct TaskHandle {
    id: String,
    store: Arc<TaskStore>,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, store: Arc<TaskStore>) -> Self {
        Self {
            id: id.into(),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current row, `None` once the cleaner has removed it.
    pub fn entry(&self) -> Result<Option<TaskEntry>> {
        Ok(self.store.get(&self.id)?)
    }

    /// Whether a one-shot entry has finished (DONE or ERROR).
    ///
    /// `None` for a periodic entry, which never finishes, and for an entry
    /// that no longer exists.
    pub fn ready(&self) -> Result<Option<bool>> {
        Ok(self.entry()?.and_then(|entry| {
            if entry.is_periodic {
                None
            } else {
                Some(entry.status.is_terminal())
            }
        }))
    }

    pub fn status(&self) -> Result<Option<TaskStatus>> {
        Ok(self.entry()?.map(|entry| entry.status))
    }

    /// Decoded return value of the last successful run.
    ///
    /// `None` when the entry is gone, has no stored result, or the stored
    /// value does not decode into `T`.
    pub fn result<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        let Some(raw) = self.entry()?.and_then(|entry| entry.result) else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(task_id = %self.id, "stored result does not decode: {e}");
                Ok(None)
            }
        }
    }

    /// Last failure description, empty when none or when the entry is gone.
    pub fn error_message(&self) -> Result<String> {
        Ok(self
            .entry()?
            .map(|entry| entry.error_message)
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}
