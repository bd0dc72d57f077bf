use std::sync::Arc;
use std::time::Duration;

use autotask_core::AutotaskConfig;
use autotask_store::TaskStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{cleaner::run_cleaner, error::Result, process::ProcessManager};

/// Leader process: owns the worker pool and the queue cleaner.
pub struct Supervisor<M: ProcessManager> {
    store: Arc<TaskStore>,
    manager: M,
    worker_count: usize,
    monitor_interval: Duration,
    clean_interval: Duration,
}

impl<M: ProcessManager> Supervisor<M> {
    pub fn new(
        store: Arc<TaskStore>,
        manager: M,
        worker_count: usize,
        monitor_interval: Duration,
        clean_interval: Duration,
    ) -> Self {
        Self {
            store,
            manager,
            worker_count,
            monitor_interval,
            clean_interval,
        }
    }

    pub fn from_config(config: &AutotaskConfig, store: Arc<TaskStore>, manager: M) -> Self {
        Self::new(
            store,
            manager,
            config.worker.count,
            config.supervisor.monitor_interval(),
            config.supervisor.clean_interval(),
        )
    }

    /// Elect this process leader and supervise until `cancel` fires.
    ///
    /// Returns `Ok(false)` straight away when another supervisor already holds
    /// the leader marker. Otherwise returns `Ok(true)` after shutdown: workers
    /// terminated, cleaner stopped, periodic entries and the marker deleted.
    pub async fn run(self, cancel: CancellationToken) -> Result<bool> {
        if !self.store.try_acquire_leader_marker()? {
            info!("another supervisor is active, not starting");
            return Ok(false);
        }
        info!(workers = self.worker_count, "supervisor elected leader");

        let cleaner = tokio::spawn(run_cleaner(
            Arc::clone(&self.store),
            self.clean_interval,
            cancel.clone(),
        ));

        let mut workers: Vec<Option<M::Process>> = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            workers.push(self.spawn_worker().await);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.monitor_interval) => self.monitor(&mut workers).await,
            }
        }

        info!("supervisor shutting down");
        for process in workers.iter_mut().flatten() {
            self.manager.terminate(process).await;
        }
        if let Err(e) = cleaner.await {
            error!("queue cleaner task failed: {e}");
        }
        self.store.delete_all_periodic()?;
        info!("supervisor stopped");
        Ok(true)
    }

    /// Replace every worker that has exited (or never started).
    async fn monitor(&self, workers: &mut [Option<M::Process>]) {
        for (slot, worker) in workers.iter_mut().enumerate() {
            let alive = match worker {
                Some(process) => self.manager.is_alive(process).await,
                None => false,
            };
            if !alive {
                warn!(slot, "worker not running, restarting");
                *worker = self.spawn_worker().await;
            }
        }
    }

    async fn spawn_worker(&self) -> Option<M::Process> {
        match self.manager.spawn().await {
            Ok(process) => Some(process),
            Err(e) => {
                error!("worker spawn failed, retrying on next check: {e}");
                None
            }
        }
    }
}
