//! `autotask-worker`: the task-handler loop run by every worker process.

pub mod error;
pub mod handler;
pub mod policy;

use std::sync::Arc;

use autotask_core::AutotaskConfig;
use autotask_store::TaskStore;
use autotask_tasks::Registry;
use tokio_util::sync::CancellationToken;

pub use error::{Result, WorkerError};
pub use handler::TaskHandler;
pub use policy::{apply_outcome, Outcome};

/// Open the configured store and run a handler until `cancel` fires.
pub async fn run_worker(
    config: &AutotaskConfig,
    registry: Registry,
    cancel: CancellationToken,
) -> Result<()> {
    let store = Arc::new(TaskStore::open(&config.database)?);
    let handler = TaskHandler::from_config(config, store, Arc::new(registry))?;
    handler.run(cancel).await;
    Ok(())
}
