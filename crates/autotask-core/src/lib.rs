//! `autotask-core`: configuration, shared errors and storage encodings used by
//! every other autotask crate.

pub mod config;
pub mod error;
pub mod time;

pub use config::{AutotaskConfig, DatabaseConfig, SupervisorConfig, WorkerConfig};
pub use error::{AutotaskError, Result};
