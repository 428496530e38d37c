//! Read, write, and list behaviour of the `Content` object.

use std::fs;
use std::io::ErrorKind;

use corral_script::{Budget, CancelSignal, ExecutionContext, HostError, ScriptError};
use rstest::rstest;
use tempfile::TempDir;

use super::support::{recording_content, root, run_with, seed};
use crate::{Content, Entry, FILE_MODE, LIST_BATCH};

const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

#[rstest]
fn write_then_read_round_trips(root: TempDir) {
    let (content, recorded) = recording_content(root.path());
    let ctx = ExecutionContext::new("round-trip");
    let entry = content
        .write(&ctx, "/a/b.txt", "hello")
        .expect("write succeeds");
    assert_eq!(entry.virtual_path, "/a/b.txt");
    assert_eq!(entry.path, root.path().join("a/b.txt"));
    assert_eq!(entry.size, 5);
    assert_eq!(entry.mode, FILE_MODE);
    assert_eq!(entry.sha256, HELLO_SHA256);
    assert_eq!(recorded.borrow().as_slice(), &[entry]);
    assert_eq!(content.read(&ctx, "/a/b.txt").expect("read"), "hello");
}

#[cfg(unix)]
#[rstest]
fn written_files_and_parents_get_fixed_modes(root: TempDir) {
    use std::os::unix::fs::PermissionsExt;

    let (content, _recorded) = recording_content(root.path());
    let ctx = ExecutionContext::new("modes");
    content.write(&ctx, "/deep/er/f.txt", "x").expect("write");
    let file_mode = fs::metadata(root.path().join("deep/er/f.txt"))
        .expect("file metadata")
        .permissions()
        .mode();
    let dir_mode = fs::metadata(root.path().join("deep"))
        .expect("dir metadata")
        .permissions()
        .mode();
    assert_eq!(file_mode & 0o777 & !0o022, 0o644);
    assert_eq!(dir_mode & 0o777 & !0o022, 0o755);
}

#[rstest]
fn scripts_write_and_read_through_the_engine(root: TempDir) {
    let (content, recorded) = recording_content(root.path());
    let script =
        "content.write(\"/notes/today.md\", \"# hi\");\nemit(content.read(\"/notes/today.md\"));";
    let emitted = run_with(content, script).expect("run");
    assert_eq!(emitted, vec!["# hi".to_owned()]);
    assert_eq!(recorded.borrow().len(), 1);
}

#[rstest]
fn writes_without_a_callback_touch_nothing(root: TempDir) {
    let content = Content::new(root.path());
    let ctx = ExecutionContext::new("no-callback");
    let error = content
        .write(&ctx, "/orphan.txt", "data")
        .expect_err("callback required");
    assert!(matches!(error, ScriptError::Host { .. }), "{error:?}");
    assert!(!root.path().join("orphan.txt").exists());
}

#[rstest]
fn callback_errors_surface_after_the_write(root: TempDir) {
    let content = Content::new(root.path())
        .on_write(|entry: &Entry| Err(HostError::from(format!("rejected {}", entry.virtual_path))));
    let ctx = ExecutionContext::new("callback-error");
    let error = content.write(&ctx, "/f.txt", "x").expect_err("rejected");
    assert_eq!(error.to_string(), "host callback failed: rejected /f.txt");
    assert!(root.path().join("f.txt").exists());
}

#[rstest]
fn write_predicate_refuses_before_writing(root: TempDir) {
    let (content, recorded) = recording_content(root.path());
    let content = content.with_write_check(|path| {
        if path.starts_with("/secret") {
            Err(HostError::from(format!("writes to {path} are not allowed")))
        } else {
            Ok(())
        }
    });
    let ctx = ExecutionContext::new("predicate");
    let error = content
        .write(&ctx, "/secret/key", "x")
        .expect_err("refused");
    assert!(matches!(error, ScriptError::Host { .. }), "{error:?}");
    assert!(!root.path().join("secret").exists());
    assert!(recorded.borrow().is_empty());
    content.write(&ctx, "/public/key", "x").expect("allowed");
}

#[rstest]
fn read_predicate_sees_normalised_paths(root: TempDir) {
    seed(root.path(), "docs/a.txt", "a");
    let content = Content::new(root.path()).with_read_check(|path| {
        if path == "/docs/a.txt" {
            Err(HostError::from("private"))
        } else {
            Ok(())
        }
    });
    let ctx = ExecutionContext::new("read-check");
    let error = content
        .read(&ctx, "/docs/./x/../a.txt")
        .expect_err("refused");
    assert_eq!(error.to_string(), "host callback failed: private");
}

#[rstest]
#[case("/../../etc/passwd")]
#[case("/a/../../b")]
fn traversal_above_the_root_is_refused(root: TempDir, #[case] path: &str) {
    let (content, _recorded) = recording_content(root.path());
    let ctx = ExecutionContext::new("traversal");
    for outcome in [
        content.read(&ctx, path).map(drop),
        content.write(&ctx, path, "x").map(drop),
        content.list(&ctx, path).map(drop),
    ] {
        assert!(
            matches!(outcome, Err(ScriptError::Confinement { .. })),
            "{outcome:?}"
        );
    }
}

#[rstest]
fn relative_paths_are_usage_errors(root: TempDir) {
    let content = Content::new(root.path());
    let ctx = ExecutionContext::new("relative");
    let error = content.read(&ctx, "a.txt").expect_err("relative");
    assert!(matches!(error, ScriptError::Usage { .. }), "{error:?}");
}

#[test]
fn relative_roots_are_internal_errors() {
    let content = Content::new("relative/root");
    let ctx = ExecutionContext::new("relative-root");
    let error = content.read(&ctx, "/a.txt").expect_err("relative root");
    assert!(matches!(error, ScriptError::Internal { .. }), "{error:?}");
}

#[rstest]
fn listing_spans_several_batches(root: TempDir) {
    for index in 0..20 {
        seed(root.path(), &format!("many/file{index:02}.txt"), "x");
    }
    fs::create_dir(root.path().join("many/sub")).expect("subdirectory");
    let content = Content::new(root.path());
    let ctx = ExecutionContext::new("list");
    let names = content.list(&ctx, "/many").expect("list");
    assert!(names.len() > LIST_BATCH);
    assert_eq!(names.len(), 21);
    assert_eq!(names.first().map(String::as_str), Some("file00.txt"));
    assert_eq!(names.last().map(String::as_str), Some("sub/"));
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(content.list(&ctx, "/many/").expect("trailing slash"), names);
}

#[rstest]
fn listing_from_a_script_suffixes_directories(root: TempDir) {
    seed(root.path(), "b.txt", "b");
    seed(root.path(), "a/inner.txt", "a");
    let emitted = run_with(Content::new(root.path()), "emit(content.list(\"/\"));").expect("run");
    assert_eq!(emitted, vec!["[\"a/\", \"b.txt\"]".to_owned()]);
}

#[rstest]
fn missing_files_name_the_virtual_path(root: TempDir) {
    let content = Content::new(root.path());
    let ctx = ExecutionContext::new("missing");
    match content.read(&ctx, "/nope//missing.txt") {
        Err(ScriptError::Io { path, source }) => {
            assert_eq!(path, "/nope//missing.txt");
            assert_eq!(source.kind(), ErrorKind::NotFound);
        }
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[rstest]
fn non_utf8_content_is_invalid_data(root: TempDir) {
    fs::write(root.path().join("bin.dat"), [0xff, 0xfe, 0x00]).expect("seed");
    let content = Content::new(root.path());
    let ctx = ExecutionContext::new("binary");
    match content.read(&ctx, "/bin.dat") {
        Err(ScriptError::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::InvalidData),
        other => panic!("expected invalid data, got {other:?}"),
    }
}

#[rstest]
fn cancelled_runs_read_nothing(root: TempDir) {
    seed(root.path(), "a.txt", "a");
    let signal = CancelSignal::new();
    let ctx = ExecutionContext::new("cancelled").with_cancel_signal(signal.clone());
    signal.cancel("stop");
    let content = Content::new(root.path());
    for outcome in [
        content.read(&ctx, "/a.txt").map(drop),
        content.list(&ctx, "/").map(drop),
    ] {
        assert!(
            matches!(outcome, Err(ScriptError::Cancelled { ref reason }) if reason == "stop"),
            "{outcome:?}"
        );
    }
    assert_eq!(signal.observer_count(), 0);
}

#[rstest]
fn io_observers_are_released_after_each_operation(root: TempDir) {
    let (content, _recorded) = recording_content(root.path());
    let signal = CancelSignal::new();
    let ctx = ExecutionContext::new("observers").with_cancel_signal(signal.clone());
    content.write(&ctx, "/f.txt", "x").expect("write");
    content.read(&ctx, "/f.txt").expect("read");
    assert_eq!(signal.observer_count(), 0);
}

#[rstest]
fn reads_are_charged_against_the_allocation_budget(root: TempDir) {
    seed(root.path(), "big.txt", &"x".repeat(4096));
    let ctx = ExecutionContext::new("budget").with_budget(Budget {
        max_steps: None,
        max_allocs: Some(1024),
    });
    let error = Content::new(root.path())
        .read(&ctx, "/big.txt")
        .expect_err("over budget");
    assert!(matches!(error, ScriptError::ResourceExceeded { .. }), "{error:?}");
}

#[rstest]
fn over_budget_writes_leave_no_file(root: TempDir) {
    let (content, recorded) = recording_content(root.path());
    let ctx = ExecutionContext::new("budget").with_budget(Budget {
        max_steps: Some(10),
        max_allocs: None,
    });
    let error = content
        .write(&ctx, "/big.txt", &"x".repeat(100))
        .expect_err("over budget");
    assert!(matches!(error, ScriptError::ResourceExceeded { .. }), "{error:?}");
    assert!(!root.path().join("big.txt").exists());
    assert!(recorded.borrow().is_empty());
}

#[rstest]
#[case::type_name("emit(type_of(content));", "Content")]
#[case::display("emit(content.to_string());", "Content{...}")]
#[case::equality("emit(content == content);", "true")]
#[case::inequality("emit(content != content);", "false")]
fn content_is_a_script_value(root: TempDir, #[case] script: &str, #[case] expected: &str) {
    let emitted = run_with(Content::new(root.path()), script).expect("run");
    assert_eq!(emitted, vec![expected.to_owned()]);
}

#[rstest]
fn methods_validate_their_arguments(root: TempDir) {
    let error = run_with(Content::new(root.path()), "content.read(1);").expect_err("usage");
    assert!(matches!(error, ScriptError::Runtime { .. }), "{error:?}");
    assert!(error.to_string().contains("Function not found: read"), "{error}");
}

#[test]
fn entries_serialise_for_hosts() {
    let entry = Entry {
        path: "/srv/a.txt".into(),
        virtual_path: "/a.txt".to_owned(),
        mode: FILE_MODE,
        size: 5,
        sha256: HELLO_SHA256.to_owned(),
    };
    let json = serde_json::to_value(&entry).expect("serialise");
    assert_eq!(json["virtual_path"], "/a.txt");
    assert_eq!(json["mode"], 420);
    assert_eq!(json["size"], 5);
}
