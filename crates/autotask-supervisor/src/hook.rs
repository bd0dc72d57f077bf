use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use autotask_core::{config::WORKER_PROCESS_ENV, AutotaskConfig};
use autotask_store::TaskStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{Result, SupervisorError},
    process::ProcessManager,
    supervisor::Supervisor,
};

static STARTED: AtomicBool = AtomicBool::new(false);

/// A supervisor running in the background of the host process.
pub struct SupervisorGuard {
    cancel: CancellationToken,
    handle: JoinHandle<Result<bool>>,
}

impl SupervisorGuard {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop the supervisor and wait for its shutdown sequence.
    ///
    /// Resolves to `false` when it lost the leader election.
    pub async fn shutdown(self) -> Result<bool> {
        self.cancel.cancel();
        self.handle
            .await
            .map_err(|e| SupervisorError::Join(e.to_string()))?
    }
}

/// Start hook for the host application.
///
/// Launches a supervisor on the current tokio runtime at most once per
/// process. Returns `None` when `is_active` is off, when running inside a
/// spawned worker, or when this process already started one. Leader election
/// happens inside the spawned task.
pub fn start_supervisor<M: ProcessManager>(
    config: &AutotaskConfig,
    manager: M,
) -> Result<Option<SupervisorGuard>> {
    let in_worker = std::env::var_os(WORKER_PROCESS_ENV).is_some();
    start_with(&STARTED, in_worker, config, manager)
}

fn start_with<M: ProcessManager>(
    started: &AtomicBool,
    in_worker: bool,
    config: &AutotaskConfig,
    manager: M,
) -> Result<Option<SupervisorGuard>> {
    if !config.is_active {
        debug!("autotask inactive, supervisor not started");
        return Ok(None);
    }
    if in_worker {
        debug!("inside a worker process, supervisor not started");
        return Ok(None);
    }
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| SupervisorError::NoRuntime)?;
    if started.swap(true, Ordering::SeqCst) {
        debug!("supervisor already started in this process");
        return Ok(None);
    }

    let store = match TaskStore::open(&config.database) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            started.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
    };
    let supervisor = Supervisor::from_config(config, store, manager);
    let cancel = CancellationToken::new();
    let handle = runtime.spawn(supervisor.run(cancel.clone()));
    info!("supervisor task started");
    Ok(Some(SupervisorGuard { cancel, handle }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcessManager;
    use autotask_core::DatabaseConfig;

    fn active_config(dir: &tempfile::TempDir) -> AutotaskConfig {
        AutotaskConfig {
            is_active: true,
            database: DatabaseConfig {
                path: dir.path().join("hook.db").to_string_lossy().into_owned(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn inactive_config_starts_nothing() {
        let started = AtomicBool::new(false);
        let config = AutotaskConfig::default();
        let guard = start_with(&started, false, &config, FakeProcessManager::default()).unwrap();
        assert!(guard.is_none());
        assert!(!started.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn worker_processes_never_start_a_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        let started = AtomicBool::new(false);
        let guard = start_with(&started, true, &active_config(&dir), FakeProcessManager::default()).unwrap();
        assert!(guard.is_none());
    }

    #[tokio::test]
    async fn starts_once_per_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = active_config(&dir);
        let started = AtomicBool::new(false);
        let manager = FakeProcessManager::default();

        let guard = start_with(&started, false, &config, manager.clone())
            .unwrap()
            .expect("first call starts");
        assert!(start_with(&started, false, &config, FakeProcessManager::default())
            .unwrap()
            .is_none());

        assert!(guard.shutdown().await.unwrap());
        assert_eq!(manager.state.lock().unwrap().spawned, config.worker.count);
    }

    #[test]
    fn needs_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let started = AtomicBool::new(false);
        let err = start_with(&started, false, &active_config(&dir), FakeProcessManager::default())
            .err()
            .unwrap();
        assert!(matches!(err, SupervisorError::NoRuntime));
    }
}
