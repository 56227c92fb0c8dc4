//! Time units supported by the cyclic timer.
//!
//! Each unit carries its ratio to one second. The table is consumed by the
//! conversion routine in [`crate::convert`]; there is no other behavior.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A time granularity in which delays, periods, and cycle counts are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// 1e-9 seconds.
    Nanosecond,
    /// 1e-6 seconds.
    Microsecond,
    /// 1e-3 seconds.
    Millisecond,
    /// The reference unit.
    #[default]
    Second,
    /// 60 seconds.
    Minute,
    /// 3600 seconds.
    Hour,
    /// 86400 seconds.
    Day,
}

impl TimeUnit {
    /// All units, smallest first.
    pub const ALL: [TimeUnit; 7] = [
        TimeUnit::Nanosecond,
        TimeUnit::Microsecond,
        TimeUnit::Millisecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
    ];

    /// The units-to-seconds multiplier for this unit.
    #[must_use]
    pub fn seconds_ratio(self) -> f64 {
        match self {
            Self::Nanosecond => 1e-9,
            Self::Microsecond => 1e-6,
            Self::Millisecond => 1e-3,
            Self::Second => 1.0,
            Self::Minute => 60.0,
            Self::Hour => 3600.0,
            Self::Day => 86400.0,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Nanosecond => "nanosecond",
            Self::Microsecond => "microsecond",
            Self::Millisecond => "millisecond",
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        };
        f.write_str(name)
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nanosecond" | "nanoseconds" | "ns" => Ok(Self::Nanosecond),
            "microsecond" | "microseconds" | "us" => Ok(Self::Microsecond),
            "millisecond" | "milliseconds" | "ms" => Ok(Self::Millisecond),
            "second" | "seconds" | "s" => Ok(Self::Second),
            "minute" | "minutes" | "min" => Ok(Self::Minute),
            "hour" | "hours" | "h" => Ok(Self::Hour),
            "day" | "days" | "d" => Ok(Self::Day),
            other => Err(format!("unknown time unit: {other}")),
        }
    }
}
