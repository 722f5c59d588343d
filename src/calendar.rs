//! Calendar decomposition of instants into tree unit values.
//!
//! An instant is converted into zoned calendar fields and split into one
//! `(level, value)` pair per tree level, Year first:
//!
//! ```text
//! 2013-05-04T10:15:00Z, UTC, Day  →  [Year(2013), Month(5), Day(4)]
//! ```
//!
//! Wall-clock reads are isolated behind [`Clock`] so "now" is injectable.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

use crate::error::TimeTreeError;
use crate::types::Resolution;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;

/// One level of a decomposed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalendarUnit {
    /// Tree level.
    pub resolution: Resolution,
    /// Value at that level.
    pub value: i32,
}

/// Parse an IANA time zone identifier such as `Europe/Prague`.
pub fn parse_time_zone(id: &str) -> Result<Tz, TimeTreeError> {
    id.parse::<Tz>()
        .map_err(|_| TimeTreeError::InvalidTimeZone(id.to_string()))
}

/// Convert epoch milliseconds into a zoned date-time.
pub fn zoned(millis: i64, tz: Tz) -> Result<DateTime<Tz>, TimeTreeError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|utc| utc.with_timezone(&tz))
        .ok_or(TimeTreeError::InvalidTimestamp(millis))
}

/// Value of a single calendar field.
pub fn unit_value(time: &DateTime<Tz>, resolution: Resolution) -> i32 {
    match resolution {
        Resolution::Year => time.year(),
        Resolution::Month => time.month() as i32,
        Resolution::Day => time.day() as i32,
        Resolution::Hour => time.hour() as i32,
        Resolution::Minute => time.minute() as i32,
        Resolution::Second => time.second() as i32,
        Resolution::Millisecond => time.timestamp_subsec_millis() as i32,
    }
}

/// Split an instant into unit values from Year down to `resolution`.
///
/// Levels finer than `resolution` are omitted.
pub fn decompose(
    millis: i64,
    tz: Tz,
    resolution: Resolution,
) -> Result<Vec<CalendarUnit>, TimeTreeError> {
    let time = zoned(millis, tz)?;
    Ok(resolution
        .levels()
        .iter()
        .map(|&level| CalendarUnit {
            resolution: level,
            value: unit_value(&time, level),
        })
        .collect())
}

/// Start of the unit following the one that contains `millis`.
///
/// Day and coarser units step in local dates, so they follow DST and have
/// variable length. Hours and finer step in absolute time from the local
/// unit start, which skips nonexistent local hours and repeats ambiguous
/// ones.
pub fn next_unit_start(millis: i64, tz: Tz, resolution: Resolution) -> Result<i64, TimeTreeError> {
    let time = zoned(millis, tz)?;
    let sub_second = i64::from(time.timestamp_subsec_millis());
    let sub_minute = i64::from(time.second()) * MILLIS_PER_SECOND + sub_second;
    let sub_hour = i64::from(time.minute()) * MILLIS_PER_MINUTE + sub_minute;

    let next = match resolution {
        Resolution::Year => local_midnight(tz, NaiveDate::from_ymd_opt(time.year() + 1, 1, 1)),
        Resolution::Month => {
            let (year, month) = if time.month() == 12 {
                (time.year() + 1, 1)
            } else {
                (time.year(), time.month() + 1)
            };
            local_midnight(tz, NaiveDate::from_ymd_opt(year, month, 1))
        }
        Resolution::Day => local_midnight(tz, time.date_naive().succ_opt()),
        Resolution::Hour => (millis - sub_hour).checked_add(MILLIS_PER_HOUR),
        Resolution::Minute => (millis - sub_minute).checked_add(MILLIS_PER_MINUTE),
        Resolution::Second => (millis - sub_second).checked_add(MILLIS_PER_SECOND),
        Resolution::Millisecond => millis.checked_add(1),
    };

    next.filter(|&n| n > millis)
        .ok_or(TimeTreeError::InvalidTimestamp(millis))
}

/// Upper bound on the number of `resolution` units touched by
/// `[start, end]`.
///
/// Uses the shortest length a unit can have in any zone (a day can lose an
/// hour, an hour can lose half of itself), so the bound never undercounts.
pub fn max_unit_count(start: i64, end: i64, resolution: Resolution) -> u64 {
    let shortest: i128 = match resolution {
        Resolution::Year => 360 * 22 * i128::from(MILLIS_PER_HOUR),
        Resolution::Month => 27 * 22 * i128::from(MILLIS_PER_HOUR),
        Resolution::Day => 22 * i128::from(MILLIS_PER_HOUR),
        Resolution::Hour => i128::from(MILLIS_PER_HOUR) / 2,
        Resolution::Minute => i128::from(MILLIS_PER_MINUTE),
        Resolution::Second => i128::from(MILLIS_PER_SECOND),
        Resolution::Millisecond => 1,
    };
    let span = (i128::from(end) - i128::from(start)).max(0);
    u64::try_from(span / shortest + 2).unwrap_or(u64::MAX)
}

/// First existing local instant of `date`, in epoch milliseconds.
///
/// Some zones skip midnight on DST days; the day then starts at the first
/// valid hour.
fn local_midnight(tz: Tz, date: Option<NaiveDate>) -> Option<i64> {
    let date = date?;
    (0..24).find_map(|hour| {
        let local = date.and_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&local)
            .earliest()
            .map(|t| t.timestamp_millis())
    })
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
