//! Runs one script against a content root and reports its artefacts.

use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use corral_config::Config;
use corral_content::{Content, Entry};
use corral_script::{Budget, Engine, HostError, Limits, Namespace, RunReport};
use tracing::info;

use crate::AppError;

const RUNNER_TARGET: &str = "corral_cli::runner";

/// Name under which the content object is visible to scripts.
pub const CONTENT_GLOBAL: &str = "content";

/// A script invocation after argument parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Directory the script's content is confined to.
    pub root: PathBuf,
    /// Script file to run.
    pub script: PathBuf,
    /// Label used in diagnostics; defaults to the script's file name.
    pub label: Option<String>,
    /// Refuse every write.
    pub read_only: bool,
}

/// Engine limits derived from configuration.
#[must_use]
pub const fn limits(config: &Config) -> Limits {
    Limits {
        budget: Budget {
            max_steps: config.max_steps(),
            max_allocs: config.max_allocs(),
        },
        timeout: config.timeout(),
    }
}

/// Runs the invocation, writing one JSON line per artefact to `stdout`.
///
/// Artefacts written before a script failure are still reported.
///
/// # Errors
///
/// Returns [`AppError`] for an unusable root or script and for script
/// failures.
pub fn execute<W: Write>(
    invocation: &Invocation,
    config: &Config,
    stdout: &mut W,
) -> Result<RunReport, AppError> {
    let root = canonical_root(&invocation.root)?;
    let source = fs::read_to_string(&invocation.script).map_err(|source| AppError::ReadScript {
        path: invocation.script.clone(),
        source,
    })?;
    let label = invocation
        .label
        .clone()
        .unwrap_or_else(|| default_label(&invocation.script));

    let recorded: Rc<RefCell<Vec<Entry>>> = Rc::default();
    let content = content_for(&root, invocation.read_only, Rc::clone(&recorded));
    let mut namespace = Namespace::new();
    namespace.insert_object(CONTENT_GLOBAL, content.into_value());

    info!(
        target: RUNNER_TARGET,
        label = %label,
        root = %root.display(),
        read_only = invocation.read_only,
        "running script"
    );
    let outcome = Engine::new()
        .with_limits(limits(config))
        .run(&label, &namespace, &source);

    for entry in recorded.borrow().iter() {
        report_entry(stdout, entry)?;
    }
    let report = outcome.map_err(AppError::Script)?;
    info!(
        target: RUNNER_TARGET,
        label = %label,
        steps = report.steps,
        allocs = report.allocs,
        artefacts = recorded.borrow().len(),
        "script finished"
    );
    Ok(report)
}

fn canonical_root(root: &Path) -> Result<PathBuf, AppError> {
    let canonical = fs::canonicalize(root).map_err(|source| AppError::Root {
        path: root.to_path_buf(),
        source,
    })?;
    if canonical.is_dir() {
        Ok(canonical)
    } else {
        Err(AppError::RootNotDirectory(canonical))
    }
}

fn default_label(script: &Path) -> String {
    script.file_name().map_or_else(
        || script.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

fn content_for(root: &Path, read_only: bool, recorded: Rc<RefCell<Vec<Entry>>>) -> Content {
    let content = Content::new(root).on_write(move |entry| {
        recorded.borrow_mut().push(entry.clone());
        Ok(())
    });
    if read_only {
        content.with_write_check(|path| {
            Err(HostError::from(format!("{path}: content is read-only")))
        })
    } else {
        content
    }
}

fn report_entry<W: Write>(stdout: &mut W, entry: &Entry) -> Result<(), AppError> {
    serde_json::to_writer(&mut *stdout, entry).map_err(AppError::SerialiseEntry)?;
    writeln!(stdout).map_err(AppError::EmitEntry)
}
