//! Unit conversion between abstract time units and concrete sleep intervals.
//!
//! A delay or period given as a unit count is converted into a whole
//! millisecond count plus the sub-millisecond nanosecond remainder. The
//! conversion goes through seconds as `f64`, so results track the unit
//! ratio table to floating-point precision, not exact integer arithmetic.

use crate::error::{TimerError, TimerResult};
use crate::unit::TimeUnit;
use std::time::Duration;

/// Nanoseconds per millisecond, the split point of the conversion.
pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// A concrete sleep interval: whole milliseconds plus the nanosecond
/// remainder below one millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SleepSpec {
    /// Whole milliseconds.
    pub millis: u64,
    /// Nanosecond remainder, always below [`NANOS_PER_MILLI`].
    pub nanos: u32,
}

impl SleepSpec {
    /// Total interval as a [`Duration`].
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.millis) + Duration::from_nanos(u64::from(self.nanos))
    }

    /// True when the interval is zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.millis == 0 && self.nanos == 0
    }

    /// Reconvert this interval back into a count of the given unit.
    ///
    /// Each leg is integer-truncated: milliseconds to whole seconds,
    /// nanoseconds to whole seconds, then the sum divided by the unit
    /// ratio and truncated again. Sub-second intervals therefore report
    /// as 0, and a count converted through [`to_millis_nanos`] and back
    /// may come out one unit short.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn to_units(self, unit: TimeUnit) -> i64 {
        let millis_to_seconds =
            (self.millis as f64 * TimeUnit::Millisecond.seconds_ratio()) as i64;
        let nanos_to_seconds =
            (f64::from(self.nanos) * TimeUnit::Nanosecond.seconds_ratio()) as i64;
        ((millis_to_seconds + nanos_to_seconds) as f64 / unit.seconds_ratio()) as i64
    }
}

/// Convert a unit count into a millisecond-plus-remainder sleep interval.
///
/// # Errors
///
/// Returns [`TimerError::Config`] when `units` is negative, and
/// [`TimerError::Overflow`] when the nanosecond value does not fit the
/// representable range.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn to_millis_nanos(units: i64, unit: TimeUnit) -> TimerResult<SleepSpec> {
    if units < 0 {
        return Err(TimerError::Config(format!(
            "unit count cannot be negative, got {units}"
        )));
    }

    let seconds = units as f64 * unit.seconds_ratio();
    let total_nanos = seconds / TimeUnit::Nanosecond.seconds_ratio();
    if !total_nanos.is_finite() || total_nanos < 0.0 || total_nanos >= i64::MAX as f64 {
        return Err(TimerError::Overflow { units, unit });
    }

    // Truncation equals floor for non-negative values, so the div/mod split
    // below matches the classic repeated-subtraction millis/nanos split.
    let total = total_nanos as i64;
    let millis = total / NANOS_PER_MILLI;
    let nanos = total % NANOS_PER_MILLI;

    Ok(SleepSpec {
        millis: millis as u64,
        nanos: nanos as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ideal nanosecond value, for tolerance checks only.
    fn ideal_nanos(units: i64, unit: TimeUnit) -> f64 {
        units as f64 * unit.seconds_ratio() * 1e9
    }

    fn total_nanos(spec: SleepSpec) -> i64 {
        spec.millis as i64 * NANOS_PER_MILLI + i64::from(spec.nanos)
    }

    #[test]
    fn test_zero_is_exact() {
        for unit in TimeUnit::ALL {
            let spec = to_millis_nanos(0, unit).unwrap();
            assert!(spec.is_zero(), "zero {unit} should convert to zero");
            assert_eq!(spec.as_duration(), Duration::ZERO);
        }
    }

    #[test]
    fn test_remainder_below_one_milli() {
        for unit in TimeUnit::ALL {
            for units in [1, 7, 999, 12_345] {
                let spec = to_millis_nanos(units, unit).unwrap();
                assert!(i64::from(spec.nanos) < NANOS_PER_MILLI);
            }
        }
    }

    #[test]
    fn test_conversion_tracks_ideal_value() {
        // The conversion goes through f64, so allow a 1000ns absolute slop
        // plus a tiny relative one.
        for unit in TimeUnit::ALL {
            for units in [1, 3, 60, 1000] {
                let spec = to_millis_nanos(units, unit).unwrap();
                let ideal = ideal_nanos(units, unit);
                let got = total_nanos(spec) as f64;
                let tolerance = 1000.0 + ideal * 1e-12;
                assert!(
                    (got - ideal).abs() <= tolerance,
                    "{units} {unit}: got {got}, ideal {ideal}"
                );
            }
        }
    }

    #[test]
    fn test_negative_units_rejected() {
        let err = to_millis_nanos(-1, TimeUnit::Second).unwrap_err();
        assert!(matches!(err, TimerError::Config(_)));
    }

    #[test]
    fn test_overflow_detected() {
        let err = to_millis_nanos(i64::MAX, TimeUnit::Day).unwrap_err();
        assert_eq!(
            err,
            TimerError::Overflow {
                units: i64::MAX,
                unit: TimeUnit::Day,
            }
        );
    }

    #[test]
    fn test_round_trip_within_truncation_tolerance() {
        // Converting a count to millis+nanos and back may lose at most one
        // unit to truncation; it never gains.
        for unit in [TimeUnit::Second, TimeUnit::Minute, TimeUnit::Hour, TimeUnit::Day] {
            for units in [0, 1, 2, 5, 59, 100] {
                let spec = to_millis_nanos(units, unit).unwrap();
                let back = spec.to_units(unit);
                assert!(
                    back == units || back == units - 1,
                    "{units} {unit} round-tripped to {back}"
                );
            }
        }
    }

    #[test]
    fn test_sub_second_intervals_report_zero_units() {
        // The reconversion truncates milliseconds to whole seconds first.
        let spec = to_millis_nanos(250, TimeUnit::Millisecond).unwrap();
        assert_eq!(spec.to_units(TimeUnit::Millisecond), 0);
    }

    #[test]
    fn test_day_scale() {
        let spec = to_millis_nanos(1, TimeUnit::Day).unwrap();
        let ideal = 86_400_000i64;
        assert!((spec.millis as i64 - ideal).abs() <= 1);
    }
}
