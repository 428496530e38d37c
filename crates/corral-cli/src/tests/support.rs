//! Shared helpers for runner tests.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use corral_config::Config;

use crate::{AppError, ConfigLoader, run_with_loader};

/// Loader returning a fixed configuration and ignoring flags.
pub(crate) struct FixedLoader(pub(crate) Config);

impl ConfigLoader for FixedLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.0.clone())
    }
}

/// Captured result of one in-process invocation.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) exit: ExitCode,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

/// Runs the CLI in-process with `config` and the given arguments.
pub(crate) fn invoke(config: Config, args: &[&str]) -> Outcome {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let argv = std::iter::once("corral")
        .chain(args.iter().copied())
        .map(OsString::from);
    let exit = run_with_loader(argv, &mut stdout, &mut stderr, &FixedLoader(config));
    Outcome {
        exit,
        stdout: String::from_utf8(stdout).expect("stdout is UTF-8"),
        stderr: String::from_utf8(stderr).expect("stderr is UTF-8"),
    }
}

/// Writes `source` to `name` inside `dir` and returns its path.
pub(crate) fn script_file(dir: &Path, name: &str, source: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, source).expect("write script");
    path
}
