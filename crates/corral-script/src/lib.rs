//! Sandboxed scripting core for Corral.
//!
//! Scripts are written in a restricted dialect of the embedded `rhai`
//! language and run synchronously on the calling thread. Every evaluation
//! step and every host operation is charged against a per-run [`Budget`], and
//! every host operation declares the [`Safety`] guarantees it provides. The
//! engine requires bounded CPU, memory, and time, so an operation that cannot
//! promise all three is refused before it does any work.
//!
//! Hosts expose their own objects by implementing [`HostObject`] and placing
//! them in the [`Namespace`] passed to [`Engine::run`]. Host functions call
//! [`admit`] to obtain the run's [`ExecutionContext`]. Long-running host
//! operations observe the run's [`CancelSignal`], which another thread or a
//! [`DeadlineTimer`] may fire at any point.
//!
//! ```rust,ignore
//! use corral_script::{Engine, Namespace};
//!
//! let report = Engine::new().run("demo.rhai", &Namespace::new(), "let x = 1 + 2;")?;
//! assert!(report.steps > 0);
//! ```

mod cancel;
mod context;
mod dialect;
mod engine;
mod error;
mod host;
mod namespace;
mod safety;
pub mod size;

pub use cancel::{CancelSignal, DeadlineTimer, ObserverGuard, TIMEOUT_REASON};
pub use context::{Budget, ExecutionContext};
pub use dialect::{
    DENIED_KEYWORDS, DialectOptions, MAX_CALL_DEPTH, MAX_EXPR_DEPTH, MAX_FUNCTION_EXPR_DEPTH,
};
pub use engine::{
    Engine, Limits, MAX_COLLECTION_LEN, MAX_STRING_BYTES, REQUIRED_SAFETY, RunReport, run,
};
pub use error::{ConfinementKind, HostError, Location, Resource, ScriptError};
pub use host::{HostResult, admit, context, raise};
pub use namespace::{HostObject, Namespace};
pub use safety::Safety;

/// The embedded runtime, for hosts registering their own functions.
pub use rhai;

#[cfg(test)]
mod tests;
