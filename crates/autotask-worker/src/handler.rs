use std::sync::Arc;
use std::time::Duration;

use autotask_core::{time::from_std, AutotaskConfig};
use autotask_store::{TaskEntry, TaskStore};
use autotask_tasks::{Registry, TaskArgs};
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::Result,
    policy::{apply_outcome, Outcome},
};

/// Worker loop: claims one entry at a time, runs it and writes the outcome back.
pub struct TaskHandler {
    store: Arc<TaskStore>,
    registry: Arc<Registry>,
    idle_interval: Duration,
    retry_delay: TimeDelta,
}

impl TaskHandler {
    pub fn new(
        store: Arc<TaskStore>,
        registry: Arc<Registry>,
        idle_interval: Duration,
        retry_delay: TimeDelta,
    ) -> Self {
        Self {
            store,
            registry,
            idle_interval,
            retry_delay,
        }
    }

    /// Build a handler from the `[worker]` section of `config`.
    pub fn from_config(
        config: &AutotaskConfig,
        store: Arc<TaskStore>,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        Ok(Self::new(
            store,
            registry,
            config.worker.idle_interval(),
            from_std(config.worker.retry_delay())?,
        ))
    }

    /// Run until `cancel` fires.
    ///
    /// A backlog drains without pauses; an empty queue is re-polled every
    /// `idle_interval`. Cancellation is only observed between entries, so an
    /// entry in flight is always written back.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            idle_ms = self.idle_interval.as_millis() as u64,
            callables = self.registry.len(),
            "worker started"
        );
        for target in self.registry.targets() {
            debug!(task = %target, "callable registered");
        }
        while !cancel.is_cancelled() {
            match self.process_next().await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("worker claim error: {e}"),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.idle_interval) => {}
            }
        }
        info!("worker stopped");
    }

    /// Claim and handle one entry; returns whether anything was claimed.
    pub async fn process_next(&self) -> Result<bool> {
        self.process_next_at(Utc::now()).await
    }

    /// As [`TaskHandler::process_next`] with an explicit clock for eligibility.
    /// The outcome is stamped with the wall clock once the callable returns.
    pub async fn process_next_at(&self, now: DateTime<Utc>) -> Result<bool> {
        let Some(entry) = self.store.claim_next_at(now)? else {
            return Ok(false);
        };
        self.handle_task(entry).await?;
        Ok(true)
    }

    /// Execute a claimed entry and persist the result of the outcome policy.
    pub async fn handle_task(&self, entry: TaskEntry) -> Result<()> {
        let outcome = self.execute(&entry).await;
        self.finish(entry, outcome, Utc::now())
    }

    fn finish(&self, mut entry: TaskEntry, outcome: Outcome, now: DateTime<Utc>) -> Result<()> {
        apply_outcome(&mut entry, outcome, now, self.retry_delay);
        self.store.save(&entry)?;
        debug!(
            task_id = %entry.id,
            status = %entry.status,
            scheduled_at = %entry.scheduled_at,
            "task written back"
        );
        Ok(())
    }

    /// Resolve, decode and run the callable. Every failure, including a panic
    /// inside the callable, becomes [`Outcome::Failed`].
    async fn execute(&self, entry: &TaskEntry) -> Outcome {
        let name = entry.display_name();
        let Some(task) = self.registry.resolve(&entry.module, &entry.function) else {
            warn!(task_id = %entry.id, task = %name, "no callable registered");
            return Outcome::Failed(format!("no task registered as {name}"));
        };
        let args = match TaskArgs::from_bytes(&entry.arguments) {
            Ok(args) => args,
            Err(e) => return Outcome::Failed(format!("cannot decode arguments: {e}")),
        };

        debug!(task_id = %entry.id, task = %name, "running task");
        let joined = tokio::task::spawn_blocking(move || task.call(args)).await;
        match joined {
            Ok(Ok(value)) => match serde_json::to_vec(&value) {
                Ok(encoded) => {
                    info!(task_id = %entry.id, task = %name, "task succeeded");
                    Outcome::Succeeded(encoded)
                }
                Err(e) => Outcome::Failed(format!("cannot encode result: {e}")),
            },
            Ok(Err(e)) => {
                warn!(task_id = %entry.id, task = %name, "task failed: {e}");
                Outcome::Failed(e.to_string())
            }
            Err(e) => {
                error!(task_id = %entry.id, task = %name, "task panicked: {e}");
                Outcome::Failed(format!("task panicked: {e}"))
            }
        }
    }
}
