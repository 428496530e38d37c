//! Entrypoint for the `corral` script runner.
//!
//! The binary delegates to [`corral_cli::run`], which loads configuration,
//! installs telemetry, runs the script, and reports written artefacts as
//! JSON lines on stdout.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    corral_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
