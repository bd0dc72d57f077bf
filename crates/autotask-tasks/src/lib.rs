//! `autotask-tasks`: registering work with the queue.
//!
//! The host application builds a [`Registry`] of callables at startup, the
//! same way every worker process does, and enqueues work through [`Tasks`]:
//!
//! - [`Tasks::delayed`] wraps a target as a one-shot task; each
//!   [`DelayedTask::call`] enqueues one entry and returns a [`TaskHandle`].
//! - [`Tasks::periodic`] and [`Tasks::cron`] register one recurring entry per
//!   target; repeated registrations are ignored.

pub mod error;
pub mod handle;
pub mod registry;
pub mod tasks;

pub use error::{Result, TaskError};
pub use handle::TaskHandle;
pub use registry::{BoxError, Registry, TaskArgs, TaskFn, TaskTarget};
pub use tasks::{DelayedOptions, DelayedTask, PeriodicOptions, Tasks};
