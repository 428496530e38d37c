//! File reads and writes that observe a run's cancellation signal.
//!
//! While a handle is open it sits in a shared slot. Each chunk borrows the
//! handle out of the slot, so no lock is held while the operating system
//! moves bytes. A cancellation observer empties the slot, which closes the
//! file once the chunk in flight completes, and the transfer then reports
//! [`ScriptError::Cancelled`] and discards whatever it had moved. The
//! observer is deregistered on every exit path because its guard is dropped
//! before the handle.
//!
//! Only regular files are transferred. Files are opened without blocking and
//! without following a final symlink, and anything else found at a resolved
//! path, such as a FIFO or a device, is refused before the first chunk.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use corral_script::{ExecutionContext, ObserverGuard, ScriptError, size};
use sha2::{Digest, Sha256};
use tracing::trace;

const IO_TARGET: &str = "corral_content::io";

/// Bytes moved per read or write call.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Permission bits applied to directories created for a write.
pub const DIR_MODE: u32 = 0o755;

type Slot<F> = Mutex<Option<Arc<F>>>;

/// An open handle that a cancellation observer may close at any time.
struct CancellableHandle<F> {
    slot: Arc<Slot<F>>,
}

impl<F> CancellableHandle<F>
where
    F: Send + Sync + 'static,
{
    /// Parks `file` in a shared slot and registers the close-on-cancel
    /// observer. Keep the returned guard alive for as long as the handle.
    fn open(ctx: &ExecutionContext, file: F) -> (Self, ObserverGuard) {
        let slot = Arc::new(Mutex::new(Some(Arc::new(file))));
        let observed = Arc::clone(&slot);
        let guard = ctx.cancel_signal().on_cancel(move || {
            let detached = lock(&observed).take();
            drop(detached);
        });
        (Self { slot }, guard)
    }

    /// Runs `op` against the handle. A closed slot, or a cancellation that
    /// lands while `op` runs, is reported as cancellation whatever `op`
    /// returned.
    fn with_file<T>(
        &self,
        ctx: &ExecutionContext,
        path: &Path,
        op: impl FnOnce(&F) -> io::Result<T>,
    ) -> Result<T, ScriptError> {
        let borrowed = lock(&self.slot).as_ref().map(Arc::clone);
        let Some(file) = borrowed else {
            return Err(closed(ctx));
        };
        let outcome = op(file.as_ref());
        drop(file);
        ctx.check_cancelled()?;
        outcome.map_err(|error| io_error(path, error))
    }
}

fn lock<F>(slot: &Slot<F>) -> MutexGuard<'_, Option<Arc<F>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn closed(ctx: &ExecutionContext) -> ScriptError {
    if ctx.cancel_signal().is_cancelled() {
        return ctx.cancel_signal().cancelled_error();
    }
    ScriptError::Internal {
        message: "file handle closed while a transfer was in progress".to_owned(),
    }
}

fn io_error(path: &Path, error: io::Error) -> ScriptError {
    ScriptError::io(path.display().to_string(), error)
}

/// Opens with `options`, refusing anything that is not a regular file.
fn open_regular(options: &mut OpenOptions, path: &Path) -> Result<File, ScriptError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_NONBLOCK | libc::O_NOFOLLOW);
    }
    let file = options.open(path).map_err(|error| io_error(path, error))?;
    let metadata = file.metadata().map_err(|error| io_error(path, error))?;
    if !metadata.is_file() {
        return Err(io_error(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ));
    }
    Ok(file)
}

/// Reads `path` as UTF-8 text, charging one step and the allocation
/// estimate per byte as each chunk arrives.
///
/// # Errors
///
/// Returns [`ScriptError::Cancelled`] when the run is cancelled before or
/// during the read, [`ScriptError::ResourceExceeded`] when a budget runs out,
/// and [`ScriptError::Io`] naming `path` for operating system failures, for
/// paths that are not regular files, and for content that is not UTF-8.
pub fn safe_read_file(ctx: &ExecutionContext, path: &Path) -> Result<String, ScriptError> {
    ctx.check_cancelled()?;
    let file = open_regular(OpenOptions::new().read(true), path)?;
    let contents = read_chunks(ctx, path, file)?;
    trace!(target: IO_TARGET, path = %path.display(), bytes = contents.len(), "file read");
    String::from_utf8(contents).map_err(|error| {
        io_error(path, io::Error::new(io::ErrorKind::InvalidData, error))
    })
}

/// Drains `source` chunk by chunk under cancellation.
pub(crate) fn read_chunks<F>(
    ctx: &ExecutionContext,
    path: &Path,
    source: F,
) -> Result<Vec<u8>, ScriptError>
where
    F: Send + Sync + 'static,
    for<'a> &'a F: Read,
{
    let (handle, _observer) = CancellableHandle::open(ctx, source);
    let mut contents = Vec::new();
    let mut chunk = vec![0_u8; CHUNK_SIZE];
    loop {
        ctx.check_cancelled()?;
        let read = handle.with_file(ctx, path, |mut file| file.read(&mut chunk))?;
        if read == 0 {
            break;
        }
        ctx.add_steps(size::bytes(read))?;
        ctx.add_allocs(size::bytes(read))?;
        contents.extend_from_slice(chunk.get(..read).unwrap_or_default());
    }
    ctx.check_cancelled()?;
    Ok(contents)
}

/// Outcome of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Written {
    /// Bytes written.
    pub size: u64,
    /// Lower-case hexadecimal SHA-256 of the written bytes.
    pub sha256: String,
}

/// Writes `data` to `path` with permission bits `mode`, creating parent
/// directories as needed.
///
/// Steps for the whole payload are charged before the file is opened, so an
/// over-budget write leaves the filesystem untouched.
///
/// # Errors
///
/// Returns [`ScriptError::Cancelled`] when the run is cancelled before or
/// during the write, [`ScriptError::ResourceExceeded`] when the step budget
/// cannot cover the payload, and [`ScriptError::Io`] naming `path` for
/// operating system failures and for paths that are not regular files.
pub fn safe_write_file(
    ctx: &ExecutionContext,
    path: &Path,
    data: &[u8],
    mode: u32,
) -> Result<Written, ScriptError> {
    ctx.add_steps(size::bytes(data.len()))?;
    if let Some(parent) = path.parent() {
        create_parents(parent).map_err(|error| io_error(parent, error))?;
    }
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    let file = open_regular(&mut options, path)?;
    let written = write_chunks(ctx, path, file, data)?;
    trace!(target: IO_TARGET, path = %path.display(), bytes = data.len(), "file written");
    Ok(written)
}

/// Feeds `data` to `sink` chunk by chunk under cancellation.
pub(crate) fn write_chunks<F>(
    ctx: &ExecutionContext,
    path: &Path,
    sink: F,
    data: &[u8],
) -> Result<Written, ScriptError>
where
    F: Send + Sync + 'static,
    for<'a> &'a F: Write,
{
    let (handle, _observer) = CancellableHandle::open(ctx, sink);
    let mut hasher = Sha256::new();
    for chunk in data.chunks(CHUNK_SIZE) {
        ctx.check_cancelled()?;
        handle.with_file(ctx, path, |mut file| file.write_all(chunk))?;
        hasher.update(chunk);
    }
    handle.with_file(ctx, path, |mut file| file.flush())?;
    ctx.check_cancelled()?;
    Ok(Written {
        size: size::bytes(data.len()),
        sha256: hex_digest(&hasher.finalize()),
    })
}

fn create_parents(parent: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(parent)
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
