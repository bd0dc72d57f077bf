use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};

/// Calendar recurrence for cron tasks.
///
/// Every field is an optional set of accepted values; `None` accepts every
/// value. Day-of-week uses crontab numbering: 0 = Sunday … 6 = Saturday, and
/// 7 is accepted as Sunday.
///
/// The pattern is stored JSON-encoded in the `cron_pattern` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_month: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u32>>,
}

/// Field order and accepted range of a five-field crontab line.
const FIELDS: [(&str, u32, u32); 5] = [
    ("minute", 0, 59),
    ("hour", 0, 23),
    ("day-of-month", 1, 31),
    ("month", 1, 12),
    ("day-of-week", 0, 7),
];

impl CronPattern {
    /// A pattern with every field unset: fires on every minute boundary.
    pub fn every_minute() -> Self {
        Self::default()
    }

    pub fn minutes(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.minutes = Some(values.into_iter().collect());
        self
    }

    pub fn hours(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.hours = Some(values.into_iter().collect());
        self
    }

    pub fn days_of_month(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.days_of_month = Some(values.into_iter().collect());
        self
    }

    pub fn months(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.months = Some(values.into_iter().collect());
        self
    }

    pub fn days_of_week(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        self.days_of_week = Some(values.into_iter().collect());
        self
    }

    /// Parse a five-field crontab expression: `minute hour dom month dow`.
    ///
    /// Each field is `*`, a single number, or a comma-separated list.
    pub fn parse(expr: &str) -> Result<Self> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != FIELDS.len() {
            return Err(ScheduleError::InvalidCron(format!(
                "expected 5 fields, got {} in {expr:?}",
                parts.len()
            )));
        }

        let pattern = Self {
            minutes: parse_field(parts[0], FIELDS[0].0)?,
            hours: parse_field(parts[1], FIELDS[1].0)?,
            days_of_month: parse_field(parts[2], FIELDS[2].0)?,
            months: parse_field(parts[3], FIELDS[3].0)?,
            days_of_week: parse_field(parts[4], FIELDS[4].0)?,
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Check every set value against its field range; empty sets are rejected
    /// because they could never match.
    pub fn validate(&self) -> Result<()> {
        let sets = [
            &self.minutes,
            &self.hours,
            &self.days_of_month,
            &self.months,
            &self.days_of_week,
        ];
        for (set, (name, min, max)) in sets.into_iter().zip(FIELDS) {
            let Some(values) = set else { continue };
            if values.is_empty() {
                return Err(ScheduleError::InvalidCron(format!("empty {name} list")));
            }
            if let Some(bad) = values.iter().find(|v| **v < min || **v > max) {
                return Err(ScheduleError::InvalidCron(format!(
                    "{name} value {bad} outside {min}-{max}"
                )));
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let pattern: Self = serde_json::from_slice(raw)?;
        pattern.validate()?;
        Ok(pattern)
    }
}

impl FromStr for CronPattern {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_field(raw: &str, name: &str) -> Result<Option<Vec<u32>>> {
    if raw == "*" {
        return Ok(None);
    }
    raw.split(',')
        .map(|item| {
            item.trim().parse::<u32>().map_err(|_| {
                ScheduleError::InvalidCron(format!("bad {name} value {item:?}"))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
