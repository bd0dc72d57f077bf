//! `autotask-store`: the SQLite-backed task queue.
//!
//! Every coordination fact lives on a row of the `tasks` table: schedule,
//! status, retry budget, result and expiry. Worker processes claim rows with
//! [`TaskStore::claim_next`]; the supervisor elects itself leader with
//! [`TaskStore::try_acquire_leader_marker`].

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::TaskStore;
pub use types::{NewTask, TaskEntry, TaskStatus, MARKER_FUNCTION, MARKER_MODULE};
