//! Shared helpers for content tests.

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use corral_script::rhai::Dynamic;
use corral_script::{Engine, Namespace, RunReport, ScriptError};
use rstest::fixture;
use tempfile::TempDir;

use crate::{Content, Entry};

/// Entries passed to the write callback, in order.
pub(crate) type Recorded = Rc<RefCell<Vec<Entry>>>;

/// Values recorded by the `emit` function, rendered with `Display`.
pub(crate) type Emitted = Rc<RefCell<Vec<String>>>;

#[fixture]
pub(crate) fn root() -> TempDir {
    TempDir::new().expect("temporary root")
}

/// Content over `root` whose write callback records every entry.
pub(crate) fn recording_content(root: &Path) -> (Content, Recorded) {
    let recorded: Recorded = Rc::default();
    let sink = Rc::clone(&recorded);
    let content = Content::new(root).on_write(move |entry| {
        sink.borrow_mut().push(entry.clone());
        Ok(())
    });
    (content, recorded)
}

/// Namespace exposing `content` and an `emit(value)` recorder.
pub(crate) fn namespace_with(content: Content) -> (Namespace, Emitted) {
    let emitted: Emitted = Rc::default();
    let sink = Rc::clone(&emitted);
    let mut namespace = Namespace::new();
    namespace.register_functions(move |engine| {
        let sink = Rc::clone(&sink);
        engine.register_fn("emit", move |value: Dynamic| {
            sink.borrow_mut().push(value.to_string());
        });
    });
    namespace.insert_object("content", content.into_value());
    (namespace, emitted)
}

/// Runs `script` against `content` and returns the emitted values.
pub(crate) fn run_with(content: Content, script: &str) -> Result<Vec<String>, ScriptError> {
    let (namespace, emitted) = namespace_with(content);
    let _report: RunReport = Engine::new().run("content.rhai", &namespace, script)?;
    let values = emitted.borrow().clone();
    Ok(values)
}

/// Writes `text` to `relative` below `root`, creating parents.
pub(crate) fn seed(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("seed parents");
    }
    fs::write(path, text).expect("seed file");
}
