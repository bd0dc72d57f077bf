use chrono::{DateTime, Datelike, DurationRound, NaiveDate, TimeDelta, TimeZone, Timelike, Utc};
use tracing::warn;

use crate::types::CronPattern;

/// Upper bound on the cron search window. Patterns that never match (31
/// February, for example) give up after this many years.
const CRON_SEARCH_YEARS: i32 = 5;

/// First run of a one-shot task: `now + delay`.
pub fn next_delay(now: DateTime<Utc>, delay: TimeDelta) -> DateTime<Utc> {
    now + delay
}

/// Next run of a fixed-interval task.
///
/// Accumulates from the previous *scheduled* time, never from the wall clock,
/// so a worker that falls behind replays every missed tick instead of
/// collapsing them.
pub fn next_periodic(last_scheduled: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    last_scheduled + interval
}

/// Earliest minute boundary strictly after `last_scheduled` matching `pattern`.
///
/// Returns `None` when nothing matches within the search window.
pub fn next_cron(last_scheduled: DateTime<Utc>, pattern: &CronPattern) -> Option<DateTime<Utc>> {
    // Truncating drops seconds, so adding one minute is always strictly later.
    let mut candidate = last_scheduled
        .duration_trunc(TimeDelta::minutes(1))
        .ok()?
        + TimeDelta::minutes(1);
    let limit_year = candidate.year() + CRON_SEARCH_YEARS;

    while candidate.year() <= limit_year {
        if !accepts(&pattern.months, candidate.month()) {
            candidate = first_of_next_month(candidate)?;
            continue;
        }
        if !day_matches(pattern, candidate) {
            candidate = start_of_day(candidate)? + TimeDelta::days(1);
            continue;
        }
        if !accepts(&pattern.hours, candidate.hour()) {
            candidate = start_of_hour(candidate) + TimeDelta::hours(1);
            continue;
        }
        if !accepts(&pattern.minutes, candidate.minute()) {
            candidate += TimeDelta::minutes(1);
            continue;
        }
        return Some(candidate);
    }

    warn!(?pattern, "cron pattern has no occurrence in the search window");
    None
}

fn accepts(set: &Option<Vec<u32>>, value: u32) -> bool {
    set.as_ref().map_or(true, |values| values.contains(&value))
}

/// Day-of-month and day-of-week are OR-combined when both are set, as in
/// conventional crontab; a single set field applies on its own.
fn day_matches(pattern: &CronPattern, at: DateTime<Utc>) -> bool {
    let dom = pattern.days_of_month.as_ref().map(|d| d.contains(&at.day()));
    let dow = pattern.days_of_week.as_ref().map(|d| {
        let weekday = at.weekday().num_days_from_sunday();
        d.contains(&weekday) || (weekday == 0 && d.contains(&7))
    });
    match (dom, dow) {
        (None, None) => true,
        (Some(m), None) | (None, Some(m)) => m,
        (Some(a), Some(b)) => a || b,
    }
}

fn start_of_day(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn start_of_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    at - TimeDelta::minutes(at.minute() as i64)
}

fn first_of_next_month(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn delay_adds_to_now() {
        let now = at(2024, 1, 1, 12, 0);
        assert_eq!(next_delay(now, TimeDelta::seconds(90)), at(2024, 1, 1, 12, 1) + TimeDelta::seconds(30));
        assert_eq!(next_delay(now, TimeDelta::zero()), now);
    }

    #[test]
    fn periodic_accumulates_without_drift() {
        let t0 = at(2024, 1, 1, 0, 0);
        let d = TimeDelta::milliseconds(20);
        let mut scheduled = t0;
        for k in 1..=50 {
            scheduled = next_periodic(scheduled, d);
            assert_eq!(scheduled, t0 + d * k);
        }
    }

    #[test]
    fn every_minute_pattern_hits_next_boundary() {
        let p = CronPattern::every_minute();
        let last = at(2024, 3, 10, 8, 15) + TimeDelta::seconds(42);
        assert_eq!(next_cron(last, &p), Some(at(2024, 3, 10, 8, 16)));
        // an exact boundary is never returned again
        assert_eq!(next_cron(at(2024, 3, 10, 8, 16), &p), Some(at(2024, 3, 10, 8, 17)));
    }

    #[test]
    fn monday_wednesday_pattern() {
        // 2024-01-01 is a Monday.
        let p = CronPattern::parse("30 7 * * 1,3").unwrap();
        let monday = at(2024, 1, 1, 7, 30);
        assert_eq!(next_cron(monday, &p), Some(at(2024, 1, 3, 7, 30)));
        // and from Wednesday on to the following Monday
        assert_eq!(next_cron(at(2024, 1, 3, 7, 30), &p), Some(at(2024, 1, 8, 7, 30)));
    }

    #[test]
    fn minutes_and_hours_lists() {
        let p = CronPattern::every_minute().minutes([15, 30]).hours([7, 20]);
        assert_eq!(next_cron(at(2024, 5, 5, 6, 0), &p), Some(at(2024, 5, 5, 7, 15)));
        assert_eq!(next_cron(at(2024, 5, 5, 7, 15), &p), Some(at(2024, 5, 5, 7, 30)));
        assert_eq!(next_cron(at(2024, 5, 5, 7, 30), &p), Some(at(2024, 5, 5, 20, 15)));
        assert_eq!(next_cron(at(2024, 5, 5, 20, 30), &p), Some(at(2024, 5, 6, 7, 15)));
    }

    #[test]
    fn day_of_month_and_weekday_are_or_combined() {
        // 1st and 15th, or any Monday, at 07:30.
        let p = CronPattern::every_minute()
            .minutes([30])
            .hours([7])
            .days_of_month([1, 15])
            .days_of_week([1]);
        // Tue 2024-01-02 -> next is Mon 2024-01-08
        assert_eq!(next_cron(at(2024, 1, 2, 8, 0), &p), Some(at(2024, 1, 8, 7, 30)));
        // Mon 2024-01-08 07:30 -> next is Mon 2024-01-15 (also the 15th)
        assert_eq!(next_cron(at(2024, 1, 8, 7, 30), &p), Some(at(2024, 1, 15, 7, 30)));
        // Mon 2024-01-29 07:30 -> Thu 2024-02-01 (dom match only)
        assert_eq!(next_cron(at(2024, 1, 29, 7, 30), &p), Some(at(2024, 2, 1, 7, 30)));
    }

    #[test]
    fn month_restriction_rolls_over_year() {
        let p = CronPattern::every_minute().minutes([0]).hours([0]).days_of_month([1]).months([4]);
        assert_eq!(next_cron(at(2024, 4, 1, 0, 0), &p), Some(at(2025, 4, 1, 0, 0)));
        assert_eq!(next_cron(at(2024, 12, 31, 23, 59), &p), Some(at(2025, 4, 1, 0, 0)));
    }

    #[test]
    fn sunday_as_seven() {
        // 2024-01-07 is a Sunday.
        let p = CronPattern::parse("0 12 * * 7").unwrap();
        assert_eq!(next_cron(at(2024, 1, 1, 0, 0), &p), Some(at(2024, 1, 7, 12, 0)));
    }

    #[test]
    fn leap_day_pattern() {
        let p = CronPattern::parse("0 0 29 2 *").unwrap();
        assert_eq!(next_cron(at(2024, 3, 1, 0, 0), &p), Some(at(2028, 2, 29, 0, 0)));
    }

    #[test]
    fn impossible_pattern_returns_none() {
        let p = CronPattern::parse("0 0 31 2 *").unwrap();
        assert_eq!(next_cron(at(2024, 1, 1, 0, 0), &p), None);
    }
}
