//! Command-line runner for Corral scripts.
//!
//! `corral [config flags] --root <DIR> [--label <LABEL>] [--read-only] <SCRIPT>`
//! loads layered configuration, installs telemetry on stderr, runs the script
//! with a `content` object confined to the root, and prints one JSON line per
//! written artefact on stdout.
//!
//! Exit codes: `0` on success, `1` when the script fails, `2` for usage,
//! configuration, and setup errors.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use corral_config::Config;
use corral_script::ScriptError;
use thiserror::Error;

mod config;
mod runner;
mod telemetry;

pub(crate) use config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};
pub use runner::{CONTENT_GLOBAL, Invocation, execute, limits};
pub use telemetry::TelemetryError;

/// Exit code for script failures.
pub const EXIT_SCRIPT_FAILURE: u8 = 1;

/// Exit code for usage, configuration, and setup failures.
pub const EXIT_USAGE: u8 = 2;

/// Arguments understood after any configuration flags.
#[derive(Debug, Parser)]
#[command(
    name = "corral",
    version,
    about = "Run a sandboxed script against a content root",
    after_help = "Configuration flags (--config-path, --log-filter, --log-format, \
                  --max-steps, --max-allocs, --timeout-ms) must precede all other arguments."
)]
pub(crate) struct Cli {
    /// Directory the script may read and write.
    #[arg(long, value_name = "DIR")]
    pub(crate) root: PathBuf,
    /// Label used in diagnostics; defaults to the script file name.
    #[arg(long)]
    pub(crate) label: Option<String>,
    /// Refuse every write the script attempts.
    #[arg(long)]
    pub(crate) read_only: bool,
    /// Script to run.
    #[arg(value_name = "SCRIPT")]
    pub(crate) script: PathBuf,
}

impl From<Cli> for Invocation {
    fn from(cli: Cli) -> Self {
        Self {
            root: cli.root,
            script: cli.script,
            label: cli.label,
            read_only: cli.read_only,
        }
    }
}

/// Failures reported by the runner.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    /// The command line was malformed.
    #[error("{0}")]
    CliUsage(clap::Error),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The content root could not be resolved.
    #[error("failed to resolve content root {}: {source}", .path.display())]
    Root {
        /// Root as given.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The content root is not a directory.
    #[error("content root {} is not a directory", .0.display())]
    RootNotDirectory(PathBuf),
    /// The script file could not be read.
    #[error("failed to read script {}: {source}", .path.display())]
    ReadScript {
        /// Script path as given.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The script failed.
    #[error(transparent)]
    Script(ScriptError),
    /// An artefact could not be serialised.
    #[error("failed to serialise artefact: {0}")]
    SerialiseEntry(serde_json::Error),
    /// An artefact could not be written to stdout.
    #[error("failed to report artefact: {0}")]
    EmitEntry(io::Error),
}

impl AppError {
    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Script(_) | Self::SerialiseEntry(_) | Self::EmitEntry(_) => {
                ExitCode::from(EXIT_SCRIPT_FAILURE)
            }
            _ => ExitCode::from(EXIT_USAGE),
        }
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    match run_inner(&args, stdout, loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            error.exit_code()
        }
    }
}

fn run_inner<W, L>(args: &[OsString], stdout: &mut W, loader: &L) -> Result<(), AppError>
where
    W: Write,
    L: ConfigLoader,
{
    let split = split_config_arguments(args);
    let cli = match Cli::try_parse_from(&split.runner_arguments) {
        Ok(cli) => cli,
        Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return write!(stdout, "{}", error.render()).map_err(AppError::EmitEntry);
        }
        Err(error) => return Err(AppError::CliUsage(error)),
    };
    let config: Config = loader.load(&split.config_arguments)?;
    telemetry::install(&config)?;
    execute(&Invocation::from(cli), &config, stdout).map(drop)
}

#[cfg(test)]
mod tests;
