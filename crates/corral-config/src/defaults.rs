use crate::logging::LogFormat;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default ceiling on computation steps per run.
pub const DEFAULT_MAX_STEPS: u64 = 10_000_000;

/// Default ceiling on estimated bytes allocated per run.
pub const DEFAULT_MAX_ALLOCS: u64 = 256 * 1024 * 1024;

/// Default wall-clock allowance per run, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}
