//! Query values for point and range operations.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::resolution::Resolution;

/// A point query: an instant plus optional resolution and time zone.
///
/// Unset fields fall back to the tree's [`TimeTreeConfig`](crate::TimeTreeConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInstant {
    /// Milliseconds since the Unix epoch.
    pub millis: i64,
    /// Deepest level to materialize.
    pub resolution: Option<Resolution>,
    /// Zone used to split the instant into calendar fields.
    pub time_zone: Option<Tz>,
}

impl TimeInstant {
    /// Query for the given epoch milliseconds with default settings.
    pub fn new(millis: i64) -> Self {
        Self {
            millis,
            resolution: None,
            time_zone: None,
        }
    }

    /// Set the resolution.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Set the time zone.
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = Some(time_zone);
        self
    }
}

/// A contiguous range query, inclusive of the unit containing `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Range start in epoch milliseconds.
    pub start: i64,
    /// Range end in epoch milliseconds.
    pub end: i64,
    /// Deepest level to materialize.
    pub resolution: Option<Resolution>,
    /// Zone used to split instants into calendar fields.
    pub time_zone: Option<Tz>,
}

impl TimeRange {
    /// Range between two epoch-millisecond instants with default settings.
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            resolution: None,
            time_zone: None,
        }
    }

    /// Set the resolution.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Set the time zone.
    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = Some(time_zone);
        self
    }

    /// The instant query for the range start.
    pub fn start_instant(&self) -> TimeInstant {
        TimeInstant {
            millis: self.start,
            resolution: self.resolution,
            time_zone: self.time_zone,
        }
    }

    /// The instant query for the range end.
    pub fn end_instant(&self) -> TimeInstant {
        TimeInstant {
            millis: self.end,
            resolution: self.resolution,
            time_zone: self.time_zone,
        }
    }
}
