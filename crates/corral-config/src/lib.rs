//! Layered configuration for the Corral runner.
//!
//! Values are merged from built-in defaults, a TOML file (`--config-path`,
//! `CORRAL_CONFIG_PATH`, or a discovered `.corral.toml`), `CORRAL_*`
//! environment variables, and command-line flags, with later layers winning.

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_ALLOCS, DEFAULT_MAX_STEPS, DEFAULT_TIMEOUT_MS,
    default_log_filter, default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Flags the configuration loader understands on the command line.
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--max-steps",
    "--max-allocs",
    "--timeout-ms",
];

/// Runner configuration.
///
/// A limit of zero disables that limit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "CORRAL")]
pub struct Config {
    /// `tracing` filter directive, for example `info` or `corral_script=debug`.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log events.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Computation steps a run may take.
    #[ortho_config(default = DEFAULT_MAX_STEPS)]
    pub max_steps: u64,
    /// Estimated bytes a run may allocate.
    #[ortho_config(default = DEFAULT_MAX_ALLOCS)]
    pub max_allocs: u64,
    /// Wall-clock milliseconds a run may take.
    #[ortho_config(default = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            max_steps: DEFAULT_MAX_STEPS,
            max_allocs: DEFAULT_MAX_ALLOCS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Filter directive for the subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Step ceiling, or `None` when unlimited.
    #[must_use]
    pub const fn max_steps(&self) -> Option<u64> {
        nonzero(self.max_steps)
    }

    /// Allocation ceiling, or `None` when unlimited.
    #[must_use]
    pub const fn max_allocs(&self) -> Option<u64> {
        nonzero(self.max_allocs)
    }

    /// Run deadline, or `None` when unlimited.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        match nonzero(self.timeout_ms) {
            Some(millis) => Some(Duration::from_millis(millis)),
            None => None,
        }
    }
}

const fn nonzero(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}
