//! Timer description loadable from TOML.
//!
//! A [`TimerSpec`] carries the configuration half of a timer: name, unit,
//! cycle budget, start arguments, and daemon flag. It deliberately performs
//! no validation of its own; the timer constructor owns the rules (negative
//! cycle counts, the infinite sentinel) so that file-based and programmatic
//! construction fail identically.

use crate::unit::TimeUnit;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Declarative description of a cyclic timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSpec {
    /// Advisory timer label; also used as the worker thread name.
    pub name: Option<String>,

    /// Unit in which `cycles`, `delay`, and `period` are expressed.
    pub unit: TimeUnit,

    /// Total cycle budget; -1 runs the timer until explicitly stopped.
    pub cycles: i64,

    /// Unit count to wait before the first cycle.
    pub delay: i64,

    /// Unit count to wait between cycles.
    pub period: i64,

    /// Whether the worker thread is detached when the timer is dropped.
    pub daemon: bool,
}

impl Default for TimerSpec {
    fn default() -> Self {
        Self {
            name: None,
            unit: TimeUnit::Second,
            cycles: 1,
            delay: 0,
            period: 1,
            daemon: false,
        }
    }
}

impl TimerSpec {
    /// Load a timer description from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a timer description from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize this description to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read timer spec {path}: {source}")]
    Io {
        /// Path to the spec file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}
