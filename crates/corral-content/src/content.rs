//! The `Content` object scripts use to read, write, and list files.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use corral_script::rhai::{self, Array, Dynamic, NativeCallContext};
use corral_script::{
    ExecutionContext, HostError, HostObject, HostResult, Safety, ScriptError, admit, raise, size,
};
use tracing::debug;

use crate::entry::{Entry, FILE_MODE};
use crate::io::{safe_read_file, safe_write_file};
use crate::resolve::{Check, Resolver, normalise};

const CONTENT_TARGET: &str = "corral_content::content";

/// Directory entries fetched from the operating system per batch.
pub const LIST_BATCH: usize = 16;

/// Guarantees declared by every `Content` method.
pub const CONTENT_SAFETY: Safety = Safety::ALL;

/// Host callback invoked after each successful write.
pub type WriteCallback = Box<dyn Fn(&Entry) -> Result<(), HostError>>;

/// Script access to the files below one root directory.
///
/// Every path a script passes in goes through the confinement [`Resolver`]
/// first, so no method touches anything outside the root.
pub struct Content {
    resolver: Resolver,
    on_write: Option<WriteCallback>,
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("resolver", &self.resolver)
            .field("on_write", &self.on_write.is_some())
            .finish()
    }
}

impl Content {
    /// Content confined to `root`, which must be absolute.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            resolver: Resolver::new(root),
            on_write: None,
        }
    }

    /// Installs the predicate consulted before reads and listings.
    #[must_use]
    pub fn with_read_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> Result<(), HostError> + 'static,
    {
        self.resolver = self.resolver.with_read_check(check);
        self
    }

    /// Installs the predicate consulted before writes.
    #[must_use]
    pub fn with_write_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&str) -> Result<(), HostError> + 'static,
    {
        self.resolver = self.resolver.with_write_check(check);
        self
    }

    /// Installs the callback that receives each written [`Entry`]. Writes
    /// fail without one.
    #[must_use]
    pub fn on_write<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Entry) -> Result<(), HostError> + 'static,
    {
        self.on_write = Some(Box::new(callback));
        self
    }

    /// Confinement root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Resolves `path` with `checks`, as every method does.
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub fn resolve(&self, path: &str, checks: Check) -> Result<PathBuf, ScriptError> {
        self.resolver.resolve(path, checks)
    }

    /// Reads the file at virtual `path`.
    ///
    /// # Errors
    ///
    /// Fails when the path is refused, the run is cancelled or over budget,
    /// or the operating system reports an error, which then names `path`.
    pub fn read(&self, ctx: &ExecutionContext, path: &str) -> Result<String, ScriptError> {
        let real = self.resolver.resolve(path, Check::READ)?;
        safe_read_file(ctx, &real).map_err(|error| polish(path, error))
    }

    /// Writes `data` to virtual `path` and reports the result to the write
    /// callback.
    ///
    /// # Errors
    ///
    /// Fails with [`ScriptError::Host`] before touching the filesystem when
    /// no callback is installed, and passes through the callback's own error
    /// after the file has been written. Otherwise fails like
    /// [`Content::read`].
    pub fn write(
        &self,
        ctx: &ExecutionContext,
        path: &str,
        data: &str,
    ) -> Result<Entry, ScriptError> {
        let Some(on_write) = &self.on_write else {
            return Err(ScriptError::host(HostError::from(
                "Content.write: no write callback installed",
            )));
        };
        let real = self.resolver.resolve(path, Check::WRITE)?;
        let virtual_path = normalise(path)?;
        let written = safe_write_file(ctx, &real, data.as_bytes(), FILE_MODE)
            .map_err(|error| polish(path, error))?;
        let entry = Entry {
            path: real,
            virtual_path,
            mode: FILE_MODE,
            size: written.size,
            sha256: written.sha256,
        };
        debug!(
            target: CONTENT_TARGET,
            path = %entry.virtual_path,
            size = entry.size,
            "content written"
        );
        on_write(&entry).map_err(ScriptError::host)?;
        Ok(entry)
    }

    /// Lists the directory at virtual `path`, suffixing subdirectories with
    /// `/` and sorting the names.
    ///
    /// # Errors
    ///
    /// Fails like [`Content::read`].
    pub fn list(&self, ctx: &ExecutionContext, path: &str) -> Result<Vec<String>, ScriptError> {
        let directory = if path.ends_with('/') {
            path.to_owned()
        } else {
            format!("{path}/")
        };
        let real = self.resolver.resolve(&directory, Check::READ)?;
        ctx.check_cancelled()?;
        let mut entries = fs::read_dir(&real).map_err(|error| ScriptError::io(path, error))?;
        let mut names = Vec::new();
        loop {
            ctx.check_cancelled()?;
            let batch = entries
                .by_ref()
                .take(LIST_BATCH)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|error| ScriptError::io(path, error))?;
            if batch.is_empty() {
                break;
            }
            for entry in batch {
                let file_type = entry
                    .file_type()
                    .map_err(|error| ScriptError::io(path, error))?;
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if file_type.is_dir() {
                    name.push('/');
                }
                ctx.add_steps(1)?;
                ctx.add_allocs(size::string(name.len()))?;
                names.push(name);
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    /// Wraps the content as a script value, ready for
    /// [`Namespace::insert_object`](corral_script::Namespace::insert_object).
    #[must_use]
    pub fn into_value(self) -> ContentValue {
        ContentValue(Rc::new(self))
    }
}

/// Names the virtual path in operating system errors.
fn polish(path: &str, error: ScriptError) -> ScriptError {
    match error {
        ScriptError::Io { source, .. } => ScriptError::Io {
            path: path.to_owned(),
            source,
        },
        other => other,
    }
}

/// Script-facing handle on a shared [`Content`].
///
/// Scripts see it as a `Content` value with `read`, `write`, and `list`
/// methods. Two handles compare equal when they share a root.
#[derive(Debug, Clone)]
pub struct ContentValue(Rc<Content>);

impl ContentValue {
    /// Underlying content.
    #[must_use]
    pub fn content(&self) -> &Content {
        &self.0
    }

    fn same_root(&self, other: &Self) -> bool {
        self.0.root() == other.0.root()
    }
}

impl HostObject for ContentValue {
    fn register(engine: &mut rhai::Engine) {
        engine
            .register_type_with_name::<Self>("Content")
            .register_fn("read", script_read)
            .register_fn("write", script_write)
            .register_fn("list", script_list)
            .register_fn("to_string", render)
            .register_fn("to_debug", render)
            .register_fn("==", |left: Self, right: Self| left.same_root(&right))
            .register_fn("!=", |left: Self, right: Self| !left.same_root(&right));
    }
}

fn render(_content: ContentValue) -> String {
    "Content{...}".to_owned()
}

fn script_read(call: NativeCallContext<'_>, content: ContentValue, path: &str) -> HostResult<String> {
    let ctx = admit(&call, "Content.read", CONTENT_SAFETY)?;
    let text = content.0.read(&ctx, path).map_err(raise)?;
    ctx.add_allocs(size::STRING_HEADER).map_err(raise)?;
    Ok(text)
}

fn script_write(
    call: NativeCallContext<'_>,
    content: ContentValue,
    path: &str,
    data: &str,
) -> HostResult<()> {
    let ctx = admit(&call, "Content.write", CONTENT_SAFETY)?;
    content.0.write(&ctx, path, data).map_err(raise)?;
    Ok(())
}

fn script_list(call: NativeCallContext<'_>, content: ContentValue, path: &str) -> HostResult<Array> {
    let ctx = admit(&call, "Content.list", CONTENT_SAFETY)?;
    let names = content.0.list(&ctx, path).map_err(raise)?;
    ctx.add_allocs(size::array(names.len())).map_err(raise)?;
    Ok(names.into_iter().map(Dynamic::from).collect())
}
