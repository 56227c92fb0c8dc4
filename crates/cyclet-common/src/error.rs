use crate::unit::TimeUnit;
use thiserror::Error;

/// Timer error types covering configuration, conversion, and state faults.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimerError {
    /// Invalid construction, mutation, or start arguments.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unit-to-nanosecond conversion exceeded the representable range.
    #[error("conversion overflow: {units} {unit}(s) exceeds the representable nanosecond range")]
    Overflow {
        /// The unit count that overflowed.
        units: i64,
        /// The unit the count was expressed in.
        unit: TimeUnit,
    },

    /// Operation attempted in a state that forbids it.
    #[error("illegal state: {0}")]
    IllegalState(String),
}

/// Convenience type alias for timer operations.
pub type TimerResult<T> = Result<T, TimerError>;
