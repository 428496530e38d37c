//! Failures raised while compiling or executing a script.
//!
//! Every failure is a `thiserror` enum variant with structured fields so
//! hosts can branch on the kind without parsing messages. I/O and host errors
//! are wrapped in `Arc` to keep the enum small and cloneable.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::safety::Safety;

/// Error type produced by host predicates and callbacks.
pub type HostError = Box<dyn StdError + Send + Sync>;

/// Source position inside a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Label of the script, usually a file name.
    pub label: String,
    /// One-based line number.
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.line)
    }
}

/// Budget dimension that was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Computation steps.
    Steps,
    /// Estimated bytes allocated.
    Allocs,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps => f.write_str("steps"),
            Self::Allocs => f.write_str("memory"),
        }
    }
}

/// Why a path was refused by the confinement resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfinementKind {
    /// The normalised path climbs above, or resolves outside, the root.
    Path,
    /// A symlink along the path points outside the root.
    Symlink,
    /// The symlink chain did not terminate within the hop limit.
    SymlinkLoop,
}

impl fmt::Display for ConfinementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => f.write_str("invalid content path"),
            Self::Symlink => f.write_str("invalid content symlink"),
            Self::SymlinkLoop => f.write_str("too many levels of symbolic links"),
        }
    }
}

/// Errors surfaced by the scripting core.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// The script text could not be parsed.
    #[error("{label}:{line}:{column}: {message}")]
    Syntax {
        /// Script label.
        label: String,
        /// One-based line of the offending token.
        line: u32,
        /// One-based column of the offending token.
        column: u32,
        /// Description of the problem.
        message: String,
    },

    /// An operation does not provide every guarantee the context requires.
    #[error("{operation} is not permitted: missing {missing} safety")]
    Capability {
        /// Name of the refused operation.
        operation: String,
        /// Guarantees required by the context but not declared by the operation.
        missing: Safety,
    },

    /// A step or allocation budget was exhausted.
    #[error("{resource} budget of {limit} exceeded")]
    ResourceExceeded {
        /// Exhausted dimension.
        resource: Resource,
        /// Configured ceiling.
        limit: u64,
    },

    /// Execution was cancelled by the host or the deadline timer.
    #[error("execution cancelled: {reason}")]
    Cancelled {
        /// Reason attached to the cancellation.
        reason: String,
    },

    /// A content path was refused by the confinement resolver.
    #[error("{kind}: {path}")]
    Confinement {
        /// Virtual path supplied by the script.
        path: String,
        /// Refusal kind.
        kind: ConfinementKind,
    },

    /// The operating system reported a failure for a content path.
    #[error("{path}: {source}")]
    Io {
        /// Path as the script sees it.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A host operation was called with unacceptable arguments.
    #[error("{message}")]
    Usage {
        /// Description of the misuse.
        message: String,
    },

    /// Evaluation failed at runtime.
    #[error("{}{message}", location_prefix(.location.as_ref()))]
    Runtime {
        /// Description of the failure.
        message: String,
        /// Statement position, when known.
        location: Option<Location>,
    },

    /// The script raised its own error with `throw`.
    #[error("script failed: {message}")]
    Failed {
        /// Rendering of the thrown value.
        message: String,
    },

    /// A host predicate or callback reported a failure.
    #[error("host callback failed: {source}")]
    Host {
        /// Error returned by the host.
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// A host-side invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
}

fn location_prefix(location: Option<&Location>) -> String {
    location.map_or_else(String::new, |location| format!("{location}: "))
}

impl ScriptError {
    /// Builds a [`ScriptError::Runtime`] raised at `line` of `label`.
    pub fn runtime_at(message: impl Into<String>, label: &str, line: Option<u32>) -> Self {
        Self::Runtime {
            message: message.into(),
            location: line.map(|line| Location {
                label: label.to_owned(),
                line,
            }),
        }
    }

    /// Builds a [`ScriptError::Usage`].
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Wraps an error returned by a host predicate or callback.
    pub fn host(source: HostError) -> Self {
        Self::Host {
            source: Arc::from(source),
        }
    }

    /// Wraps an I/O error reported for `path`.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` when the error reports a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
