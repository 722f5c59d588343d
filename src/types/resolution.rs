//! Calendar resolutions (tree levels).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Label carried by the implicit root in single-root mode.
pub const TIME_TREE_ROOT_LABEL: &str = "TimeTreeRoot";

/// Calendar level of a tree node, also used as the resolution of a query.
///
/// Levels are totally ordered coarsest to finest. A node at level `L` only
/// ever has children at `L.child()`; a query at resolution `R` materializes
/// levels `Year..=R` and nothing deeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Calendar year.
    Year,
    /// Month of year, 1-12.
    Month,
    /// Day of month, 1-31.
    Day,
    /// Hour of day, 0-23.
    Hour,
    /// Minute of hour, 0-59.
    Minute,
    /// Second of minute, 0-59.
    Second,
    /// Millisecond of second, 0-999.
    Millisecond,
}

impl Resolution {
    /// Every level, coarsest first.
    pub const ALL: [Resolution; 7] = [
        Self::Year,
        Self::Month,
        Self::Day,
        Self::Hour,
        Self::Minute,
        Self::Second,
        Self::Millisecond,
    ];

    /// Parse a resolution from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            "hour" => Some(Self::Hour),
            "minute" => Some(Self::Minute),
            "second" => Some(Self::Second),
            "millisecond" => Some(Self::Millisecond),
            _ => None,
        }
    }

    /// Label attached to nodes of this level.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Year => "Year",
            Self::Month => "Month",
            Self::Day => "Day",
            Self::Hour => "Hour",
            Self::Minute => "Minute",
            Self::Second => "Second",
            Self::Millisecond => "Millisecond",
        }
    }

    /// Zero-based depth below the root (Year = 0).
    pub fn depth(&self) -> usize {
        *self as usize
    }

    /// The level one step finer, if any.
    pub fn child(&self) -> Option<Self> {
        Self::ALL.get(self.depth() + 1).copied()
    }

    /// Whether this is the finest level.
    pub fn is_deepest(&self) -> bool {
        self.child().is_none()
    }

    /// Levels materialized for a query at this resolution, coarsest first.
    pub fn levels(&self) -> &'static [Resolution] {
        &Self::ALL[..=self.depth()]
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::Day
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
