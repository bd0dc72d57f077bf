//! Outcome policy: how a finished execution mutates its entry.

use autotask_schedule::{next_cron, next_periodic, CronPattern};
use autotask_store::{TaskEntry, TaskStatus};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, warn};

/// Result of running one entry's callable.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// JSON-encoded return value.
    Succeeded(Vec<u8>),
    /// Failure description recorded as the entry's error message.
    Failed(String),
}

/// Apply `outcome` to a claimed `entry` finished at `now`.
///
/// One-shot entries end in DONE or ERROR (with `expire_at = now + ttl`) or go
/// back to WAITING at `now + retry_delay` while retries remain. Periodic and
/// cron entries always go back to WAITING at their next occurrence.
pub fn apply_outcome(
    entry: &mut TaskEntry,
    outcome: Outcome,
    now: DateTime<Utc>,
    retry_delay: TimeDelta,
) {
    match outcome {
        Outcome::Succeeded(result) => {
            entry.result = Some(result);
            entry.error_message.clear();
            if entry.is_periodic {
                reschedule(entry);
            } else {
                finish(entry, TaskStatus::Done, now);
            }
        }
        Outcome::Failed(message) => {
            entry.error_message = message;
            if entry.is_periodic {
                reschedule(entry);
            } else if entry.retries > 0 {
                entry.retries -= 1;
                entry.status = TaskStatus::Waiting;
                entry.scheduled_at = now + retry_delay;
            } else {
                finish(entry, TaskStatus::Error, now);
            }
        }
    }
}

fn finish(entry: &mut TaskEntry, status: TaskStatus, now: DateTime<Utc>) {
    entry.status = status;
    entry.expire_at = Some(now + entry.ttl);
}

/// Move a periodic entry to its next occurrence.
///
/// A cron pattern that cannot be decoded, or that has no further occurrence,
/// pins the entry in ERROR with `scheduled_at` untouched.
fn reschedule(entry: &mut TaskEntry) {
    if let Some(raw) = &entry.cron_pattern {
        let next = match CronPattern::from_bytes(raw) {
            Ok(pattern) => next_cron(entry.scheduled_at, &pattern)
                .ok_or_else(|| "cron pattern has no further occurrence".to_string()),
            Err(e) => Err(format!("invalid cron pattern: {e}")),
        };
        match next {
            Ok(at) => {
                entry.status = TaskStatus::Waiting;
                entry.scheduled_at = at;
            }
            Err(message) => {
                error!(task_id = %entry.id, "{message}; entry left in error");
                entry.status = TaskStatus::Error;
                entry.error_message = message;
            }
        }
        return;
    }

    match entry.interval {
        Some(interval) => {
            entry.status = TaskStatus::Waiting;
            entry.scheduled_at = next_periodic(entry.scheduled_at, interval);
        }
        None => {
            warn!(task_id = %entry.id, "periodic entry without interval or cron pattern");
            entry.status = TaskStatus::Error;
            entry.error_message = "periodic entry has no interval or cron pattern".into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotask_schedule::CronPattern;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 7, 30, 0).unwrap()
    }

    fn entry(is_periodic: bool) -> TaskEntry {
        TaskEntry {
            id: "id".into(),
            seq: 1,
            scheduled_at: t0(),
            module: "m".into(),
            function: "f".into(),
            arguments: b"{}".to_vec(),
            is_periodic,
            interval: None,
            cron_pattern: None,
            status: TaskStatus::Running,
            retries: 0,
            result: None,
            error_message: String::new(),
            ttl: TimeDelta::seconds(300),
            expire_at: None,
        }
    }

    #[test]
    fn one_shot_success_is_done_with_expiry() {
        let mut e = entry(false);
        e.error_message = "earlier failure".into();
        let now = t0() + TimeDelta::seconds(3);
        apply_outcome(&mut e, Outcome::Succeeded(b"1".to_vec()), now, TimeDelta::seconds(2));
        assert_eq!(e.status, TaskStatus::Done);
        assert_eq!(e.result.as_deref(), Some(&b"1"[..]));
        assert_eq!(e.error_message, "");
        assert_eq!(e.expire_at, Some(now + TimeDelta::seconds(300)));
    }

    #[test]
    fn one_shot_failure_consumes_retries_then_errors() {
        let mut e = entry(false);
        e.retries = 1;
        let now = t0() + TimeDelta::seconds(1);
        apply_outcome(&mut e, Outcome::Failed("boom".into()), now, TimeDelta::seconds(2));
        assert_eq!(e.status, TaskStatus::Waiting);
        assert_eq!(e.retries, 0);
        assert_eq!(e.scheduled_at, now + TimeDelta::seconds(2));
        assert_eq!(e.expire_at, None);

        let later = now + TimeDelta::seconds(5);
        apply_outcome(&mut e, Outcome::Failed("boom again".into()), later, TimeDelta::seconds(2));
        assert_eq!(e.status, TaskStatus::Error);
        assert_eq!(e.error_message, "boom again");
        assert_eq!(e.expire_at, Some(later + TimeDelta::seconds(300)));
    }

    #[test]
    fn periodic_reschedules_from_last_scheduled_either_way() {
        let mut e = entry(true);
        e.interval = Some(TimeDelta::milliseconds(20));
        let late = t0() + TimeDelta::seconds(10);
        apply_outcome(&mut e, Outcome::Succeeded(b"null".to_vec()), late, TimeDelta::seconds(2));
        assert_eq!(e.status, TaskStatus::Waiting);
        assert_eq!(e.scheduled_at, t0() + TimeDelta::milliseconds(20));

        apply_outcome(&mut e, Outcome::Failed("x".into()), late, TimeDelta::seconds(2));
        assert_eq!(e.status, TaskStatus::Waiting);
        assert_eq!(e.scheduled_at, t0() + TimeDelta::milliseconds(40));
        assert_eq!(e.error_message, "x");
        assert_eq!(e.expire_at, None);
    }

    #[test]
    fn cron_reschedules_to_next_match() {
        let mut e = entry(true);
        e.cron_pattern = Some(CronPattern::parse("30 7 * * 1,3").unwrap().to_bytes().unwrap());
        apply_outcome(&mut e, Outcome::Succeeded(b"null".to_vec()), t0(), TimeDelta::zero());
        assert_eq!(e.status, TaskStatus::Waiting);
        assert_eq!(e.scheduled_at, Utc.with_ymd_and_hms(2024, 1, 3, 7, 30, 0).unwrap());
    }

    #[test]
    fn corrupt_cron_pins_entry_in_error() {
        let mut e = entry(true);
        e.cron_pattern = Some(b"\x00garbage".to_vec());
        apply_outcome(&mut e, Outcome::Failed("task failed".into()), t0() + TimeDelta::minutes(1), TimeDelta::zero());
        assert_eq!(e.status, TaskStatus::Error);
        assert_eq!(e.scheduled_at, t0());
        assert!(e.error_message.starts_with("invalid cron pattern"));
    }
}
