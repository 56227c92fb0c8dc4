#![doc = "Common types shared across the cyclet workspace."]

pub mod config;
pub mod convert;
pub mod error;
pub mod unit;

pub use config::*;
pub use convert::*;
pub use error::*;
pub use unit::*;

/// Sentinel cycle count for a timer that runs until explicitly stopped.
///
/// When passed as a total cycle count the timer reports an internal total
/// of 1 and never decrements its remaining cycles.
pub const INFINITE: i64 = -1;
