//! `autotask-schedule`: next-occurrence calculation for autotask entries.
//!
//! # Schedule kinds
//!
//! | Kind      | First run               | Next run                              |
//! |-----------|-------------------------|---------------------------------------|
//! | one-shot  | `now + delay`           | `now + retry_delay` after a failure   |
//! | periodic  | `now` or `now + interval` | `last_scheduled + interval`         |
//! | cron      | `next_cron(now, p)`     | `next_cron(last_scheduled, p)`        |
//!
//! All functions are pure; callers pass the clock in.

pub mod error;
pub mod schedule;
pub mod types;

pub use error::{Result, ScheduleError};
pub use schedule::{next_cron, next_delay, next_periodic};
pub use types::CronPattern;
