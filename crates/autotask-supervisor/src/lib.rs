//! `autotask-supervisor`: leader election and worker-pool management.
//!
//! Exactly one process per database runs a [`Supervisor`]: it holds the
//! leader marker, keeps `worker.count` worker processes alive, runs the queue
//! cleaner, and on shutdown stops the workers and clears every periodic entry
//! so the next leader registers them afresh.

pub mod cleaner;
pub mod error;
pub mod hook;
pub mod process;
pub mod shutdown;
pub mod supervisor;

pub use cleaner::run_cleaner;
pub use error::{Result, SupervisorError};
pub use hook::{start_supervisor, SupervisorGuard};
pub use process::{CommandProcessManager, ProcessManager};
pub use shutdown::{listen, Role};
pub use supervisor::Supervisor;
