//! Cooperative cancellation shared between a running script and its host.
//!
//! A [`CancelSignal`] is cloned freely across threads. Cancelling it records a
//! reason, flips a flag checked at every budget charge, and runs the
//! registered observers exactly once. Observers are detached from the registry
//! before they run, so the cancelling thread never holds the registry lock
//! while an observer works and an observer may itself touch the signal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::error::ScriptError;

const CANCEL_TARGET: &str = "corral_script::cancel";

/// Reason recorded when the deadline timer fires.
pub const TIMEOUT_REASON: &str = "timeout";

type Observer = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct ObserverTable {
    next_id: u64,
    entries: BTreeMap<u64, Observer>,
}

#[derive(Default)]
struct SignalInner {
    cancelled: AtomicBool,
    reason: OnceLock<String>,
    observers: Mutex<ObserverTable>,
}

impl SignalInner {
    fn table(&self) -> MutexGuard<'_, ObserverTable> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe cancellation flag with close-on-cancel observers.
#[derive(Clone, Default)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

impl CancelSignal {
    /// Creates a signal that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the signal and runs every registered observer.
    ///
    /// Returns `false` when the signal had already been cancelled, in which
    /// case the original reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let observers = {
            let mut table = self.inner.table();
            if self.inner.cancelled.load(Ordering::Acquire) {
                return false;
            }
            let reason = reason.into();
            debug!(
                target: CANCEL_TARGET,
                reason = %reason,
                observers = table.entries.len(),
                "cancelling execution"
            );
            self.inner.reason.get_or_init(|| reason);
            self.inner.cancelled.store(true, Ordering::Release);
            std::mem::take(&mut table.entries)
        };
        for observer in observers.into_values() {
            observer();
        }
        true
    }

    /// Returns `true` once [`CancelSignal::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        if self.is_cancelled() {
            self.inner.reason.get().map(String::as_str)
        } else {
            None
        }
    }

    /// Fails with [`ScriptError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<(), ScriptError> {
        if self.is_cancelled() {
            return Err(self.cancelled_error());
        }
        Ok(())
    }

    /// Builds the error reported for this signal's cancellation.
    #[must_use]
    pub fn cancelled_error(&self) -> ScriptError {
        ScriptError::Cancelled {
            reason: self.reason().unwrap_or("cancelled").to_owned(),
        }
    }

    /// Registers `observer` to run when the signal is cancelled.
    ///
    /// When the signal is already cancelled the observer runs immediately on
    /// the calling thread. Dropping the returned guard deregisters the
    /// observer.
    pub fn on_cancel<F>(&self, observer: F) -> ObserverGuard
    where
        F: FnOnce() + Send + 'static,
    {
        let mut table = self.inner.table();
        if self.inner.cancelled.load(Ordering::Acquire) {
            drop(table);
            observer();
            return ObserverGuard {
                inner: None,
                id: 0,
            };
        }
        let id = table.next_id;
        table.next_id += 1;
        table.entries.insert(id, Box::new(observer));
        ObserverGuard {
            inner: Some(Arc::clone(&self.inner)),
            id,
        }
    }

    /// Number of observers still registered.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner.table().entries.len()
    }
}

/// Deregisters a cancellation observer when dropped.
#[must_use = "dropping the guard deregisters the observer immediately"]
pub struct ObserverGuard {
    inner: Option<Arc<SignalInner>>,
    id: u64,
}

impl fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverGuard")
            .field("id", &self.id)
            .field("armed", &self.inner.is_some())
            .finish()
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.table().entries.remove(&self.id);
        }
    }
}

/// Background timer that cancels a signal when a deadline passes.
///
/// Dropping the timer disarms it and joins the timer thread.
#[derive(Debug)]
pub struct DeadlineTimer {
    disarm: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeadlineTimer {
    /// Starts a timer that cancels `signal` with [`TIMEOUT_REASON`] after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Internal`] when the timer thread cannot be
    /// spawned.
    pub fn arm(signal: &CancelSignal, timeout: Duration) -> Result<Self, ScriptError> {
        let (disarm, armed) = mpsc::channel::<()>();
        let signal = signal.clone();
        let handle = thread::Builder::new()
            .name("corral-deadline".to_owned())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = armed.recv_timeout(timeout) {
                    signal.cancel(TIMEOUT_REASON);
                }
            })
            .map_err(|error| ScriptError::Internal {
                message: format!("failed to start deadline timer: {error}"),
            })?;
        Ok(Self {
            disarm: Some(disarm),
            handle: Some(handle),
        })
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        drop(self.disarm.take());
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.join().is_err() {
            debug!(target: CANCEL_TARGET, "deadline timer thread panicked");
        }
    }
}
