//! Delay computation for jobs scheduled at a point in time.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{ERROR_DATE_BEFORE, SECONDS_PER_DAY};
use crate::error::{PeriodicError, Result};

/// Point in time a job is scheduled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAt {
    /// Time of day: today, or tomorrow once it has passed
    Time(NaiveTime),
    /// Time of day at a fixed offset: today, or tomorrow once it has passed
    TimeWithOffset(NaiveTime, FixedOffset),
    /// Start of the given day
    Date(NaiveDate),
    /// Local wall-clock date and time
    DateTime(NaiveDateTime),
    /// Date and time with an explicit offset
    Zoned(DateTime<FixedOffset>),
}

impl ScheduleAt {
    pub fn is_time_of_day(&self) -> bool {
        matches!(self, ScheduleAt::Time(_) | ScheduleAt::TimeWithOffset(..))
    }
}

impl FromStr for ScheduleAt {
    type Err = PeriodicError;

    /// Accepts `HH:MM[:SS]` with an optional `Z` or `±HH:MM` suffix, `YYYY-MM-DD`,
    /// `YYYY-MM-DDTHH:MM[:SS]` and RFC 3339.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(zoned) = DateTime::parse_from_rfc3339(s) {
            return Ok(ScheduleAt::Zoned(zoned));
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
            if let Ok(at) = NaiveDateTime::parse_from_str(s, format) {
                return Ok(ScheduleAt::DateTime(at));
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Ok(ScheduleAt::Date(date));
        }
        if let Some(time) = parse_time_of_day(s) {
            return Ok(ScheduleAt::Time(time));
        }
        if let Some((time, offset)) = parse_time_with_offset(s) {
            return Ok(ScheduleAt::TimeWithOffset(time, offset));
        }
        Err(PeriodicError::InvalidSchedule(format!(
            "Unrecognised point in time: [{s}]"
        )))
    }
}

fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M"]
        .into_iter()
        .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
}

fn parse_time_with_offset(s: &str) -> Option<(NaiveTime, FixedOffset)> {
    if let Some(time) = s.strip_suffix('Z') {
        return Some((parse_time_of_day(time)?, FixedOffset::east_opt(0)?));
    }
    let (time, offset) = s.split_at(s.rfind(|c: char| c == '+' || c == '-')?);
    let offset = DateTime::parse_from_str(&format!("1970-01-01 00:00{offset}"), "%Y-%m-%d %H:%M%:z")
        .map(|at| *at.offset())
        .ok()?;
    Some((parse_time_of_day(time)?, offset))
}

fn seconds_until_time_of_day(time: NaiveTime, now: NaiveDateTime) -> i64 {
    let seconds = (time - now.time()).num_seconds();
    if seconds < 0 {
        seconds + SECONDS_PER_DAY as i64
    } else {
        seconds
    }
}

/// Offset of the local zone at local wall-clock time `now`.
fn local_offset(now: NaiveDateTime) -> FixedOffset {
    Local
        .offset_from_local_datetime(&now)
        .earliest()
        .unwrap_or_else(|| Local.offset_from_utc_datetime(&now))
}

/// Whole seconds from `now` (local wall clock) until `at`, truncated toward zero.
///
/// A time of day that has already passed today resolves to tomorrow. Any other point in
/// the past is rejected.
pub fn delay_until(at: &ScheduleAt, now: NaiveDateTime) -> Result<Duration> {
    let seconds = match at {
        ScheduleAt::Time(time) => seconds_until_time_of_day(*time, now),
        ScheduleAt::TimeWithOffset(time, offset) => {
            let shift = local_offset(now).local_minus_utc() - offset.local_minus_utc();
            let local = *time + chrono::Duration::seconds(i64::from(shift));
            seconds_until_time_of_day(local, now)
        }
        ScheduleAt::Date(date) => (date.and_time(NaiveTime::MIN) - now).num_seconds(),
        ScheduleAt::DateTime(at) => (*at - now).num_seconds(),
        ScheduleAt::Zoned(at) => (at.with_timezone(&Local).naive_local() - now).num_seconds(),
    };

    u64::try_from(seconds)
        .map(Duration::from_secs)
        .map_err(|_| PeriodicError::InvalidSchedule(ERROR_DATE_BEFORE.to_string()))
}

/// [`delay_until`] measured from the current local time.
pub fn delay_from_now(at: &ScheduleAt) -> Result<Duration> {
    delay_until(at, Local::now().naive_local())
}
