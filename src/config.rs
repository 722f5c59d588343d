//! Tree-wide defaults.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `TIMETREE_RESOLUTION`: default resolution, e.g. `day` (default: day)
//! - `TIMETREE_TIME_ZONE`: default IANA zone, e.g. `Europe/Prague` (default: UTC)

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::{Resolution, TimeInstant, TimeRange};

/// Defaults applied to queries that leave resolution or zone unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTreeConfig {
    /// Resolution used when a query does not name one.
    #[serde(default)]
    pub default_resolution: Resolution,
    /// Time zone used when a query does not name one.
    #[serde(default = "default_time_zone")]
    pub default_time_zone: Tz,
}

fn default_time_zone() -> Tz {
    Tz::UTC
}

impl TimeTreeConfig {
    /// Create a configuration with explicit defaults.
    pub fn new(default_resolution: Resolution, default_time_zone: Tz) -> Self {
        Self {
            default_resolution,
            default_time_zone,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let default_resolution = match std::env::var("TIMETREE_RESOLUTION") {
            Ok(s) => Resolution::from_str(&s).unwrap_or_else(|| {
                tracing::warn!(value = %s, "Ignoring unknown TIMETREE_RESOLUTION");
                defaults.default_resolution
            }),
            Err(_) => defaults.default_resolution,
        };

        let default_time_zone = match std::env::var("TIMETREE_TIME_ZONE") {
            Ok(s) => s.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(value = %s, "Ignoring unknown TIMETREE_TIME_ZONE");
                defaults.default_time_zone
            }),
            Err(_) => defaults.default_time_zone,
        };

        Self {
            default_resolution,
            default_time_zone,
        }
    }

    /// Effective resolution and zone for a point query.
    pub fn resolve_instant(&self, instant: &TimeInstant) -> (Resolution, Tz) {
        (
            instant.resolution.unwrap_or(self.default_resolution),
            instant.time_zone.unwrap_or(self.default_time_zone),
        )
    }

    /// Effective resolution and zone for a range query.
    pub fn resolve_range(&self, range: &TimeRange) -> (Resolution, Tz) {
        (
            range.resolution.unwrap_or(self.default_resolution),
            range.time_zone.unwrap_or(self.default_time_zone),
        )
    }
}

impl Default for TimeTreeConfig {
    fn default() -> Self {
        Self {
            default_resolution: Resolution::Day,
            default_time_zone: default_time_zone(),
        }
    }
}
