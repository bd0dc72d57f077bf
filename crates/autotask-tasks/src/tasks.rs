use std::sync::Arc;

use autotask_schedule::{next_cron, next_delay, CronPattern};
use autotask_store::{NewTask, TaskStore};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::{
    error::{Result, TaskError},
    handle::TaskHandle,
    registry::{TaskArgs, TaskTarget},
};

/// Options for a one-shot task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedOptions {
    /// Wait before the first attempt.
    pub delay: TimeDelta,
    /// Extra attempts after a failure; the entry runs at most `retries + 1` times.
    pub retries: u32,
    /// How long the finished entry is kept before the cleaner deletes it.
    pub ttl: TimeDelta,
}

impl Default for DelayedOptions {
    fn default() -> Self {
        Self {
            delay: TimeDelta::zero(),
            retries: 0,
            ttl: TimeDelta::seconds(300),
        }
    }
}

/// Options for a fixed-interval task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicOptions {
    pub interval: TimeDelta,
    /// Run once right away instead of waiting one interval first.
    pub start_now: bool,
}

impl Default for PeriodicOptions {
    fn default() -> Self {
        Self {
            interval: TimeDelta::seconds(3600),
            start_now: false,
        }
    }
}

/// Registration facade used by the host application.
///
/// Only writes entries; execution happens in worker processes.
#[derive(Clone)]
pub struct Tasks {
    store: Arc<TaskStore>,
}

impl Tasks {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Handle for an existing entry id.
    pub fn handle(&self, id: impl Into<String>) -> TaskHandle {
        TaskHandle::new(id, Arc::clone(&self.store))
    }

    /// Wrap `target` as a one-shot task. Every [`DelayedTask::call`] enqueues
    /// a new entry.
    pub fn delayed(&self, target: TaskTarget, options: DelayedOptions) -> Result<DelayedTask> {
        if options.delay < TimeDelta::zero() || options.ttl < TimeDelta::zero() {
            return Err(TaskError::InvalidOption(format!(
                "negative delay or ttl for {target}"
            )));
        }
        Ok(DelayedTask {
            target,
            options,
            store: Arc::clone(&self.store),
        })
    }

    /// Register a fixed-interval task.
    ///
    /// Returns `None` when a periodic entry for `target` already exists.
    pub fn periodic(
        &self,
        target: TaskTarget,
        options: PeriodicOptions,
        args: TaskArgs,
    ) -> Result<Option<TaskHandle>> {
        self.periodic_at(target, options, args, Utc::now())
    }

    pub fn periodic_at(
        &self,
        target: TaskTarget,
        options: PeriodicOptions,
        args: TaskArgs,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskHandle>> {
        if options.interval <= TimeDelta::zero() {
            return Err(TaskError::InvalidOption(format!(
                "interval must be positive for {target}"
            )));
        }
        let first = if options.start_now {
            now
        } else {
            now + options.interval
        };
        let task = NewTask::periodic(
            target.module.as_str(),
            target.function.as_str(),
            args.to_bytes()?,
            first,
            options.interval,
        );
        let created = self.store.create_periodic_if_absent(task)?;
        if created.is_some() {
            info!(%target, interval_ms = options.interval.num_milliseconds(), "periodic task registered");
        }
        Ok(created.map(|entry| self.handle(entry.id)))
    }

    /// Register a cron task; first run is the first match after now.
    ///
    /// Returns `None` when a periodic entry for `target` already exists.
    pub fn cron(
        &self,
        target: TaskTarget,
        pattern: &CronPattern,
        args: TaskArgs,
    ) -> Result<Option<TaskHandle>> {
        self.cron_at(target, pattern, args, Utc::now())
    }

    pub fn cron_at(
        &self,
        target: TaskTarget,
        pattern: &CronPattern,
        args: TaskArgs,
        now: DateTime<Utc>,
    ) -> Result<Option<TaskHandle>> {
        pattern.validate()?;
        let first = next_cron(now, pattern).ok_or_else(|| {
            TaskError::InvalidOption(format!("cron pattern for {target} never matches"))
        })?;
        let task = NewTask::cron(
            target.module.as_str(),
            target.function.as_str(),
            args.to_bytes()?,
            first,
            pattern.to_bytes()?,
        );
        let created = self.store.create_periodic_if_absent(task)?;
        if created.is_some() {
            info!(%target, first_run = %first, "cron task registered");
        }
        Ok(created.map(|entry| self.handle(entry.id)))
    }
}

/// A callable wrapped as a one-shot task.
#[derive(Clone)]
pub struct DelayedTask {
    target: TaskTarget,
    options: DelayedOptions,
    store: Arc<TaskStore>,
}

impl DelayedTask {
    pub fn target(&self) -> &TaskTarget {
        &self.target
    }

    pub fn options(&self) -> DelayedOptions {
        self.options
    }

    /// Enqueue one invocation.
    pub fn call(&self, args: TaskArgs) -> Result<TaskHandle> {
        self.call_at(args, Utc::now())
    }

    pub fn call_at(&self, args: TaskArgs, now: DateTime<Utc>) -> Result<TaskHandle> {
        let task = NewTask::one_shot(
            self.target.module.as_str(),
            self.target.function.as_str(),
            args.to_bytes()?,
            next_delay(now, self.options.delay),
            self.options.retries,
            self.options.ttl,
        );
        let entry = self.store.create(task)?;
        debug!(task_id = %entry.id, target = %self.target, "task enqueued");
        Ok(TaskHandle::new(entry.id, Arc::clone(&self.store)))
    }
}
