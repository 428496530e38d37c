//! Log output for the runner.
//!
//! Events go to stderr because stdout carries the artefact report. The
//! subscriber is installed once per process; later runs in the same process
//! only check their filter.

use std::io::{self, IsTerminal};

use corral_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::time::UtcTime;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Errors raised while setting up log output.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter does not parse.
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    /// Another global subscriber was already in place.
    #[error("failed to install log subscriber: {0}")]
    Install(#[from] SetGlobalDefaultError),
}

/// Installs the stderr subscriber described by `config`.
///
/// # Errors
///
/// Fails when the log filter does not parse, on every call, and when the
/// first call finds a foreign global subscriber.
pub(crate) fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())?;
    INSTALLED
        .get_or_try_init(|| {
            let builder = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .with_timer(UtcTime::rfc_3339());
            match config.log_format() {
                LogFormat::Json => set_global_default(builder.json().flatten_event(true).finish()),
                LogFormat::Compact => set_global_default(builder.compact().finish()),
            }
        })
        .map(drop)
        .map_err(TelemetryError::from)
}
