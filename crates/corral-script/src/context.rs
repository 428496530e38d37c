//! Per-run execution context: budgets, required safety, and cancellation.

use std::cell::Cell;

use tracing::trace;

use crate::cancel::CancelSignal;
use crate::error::{Resource, ScriptError};
use crate::safety::Safety;

const CONTEXT_TARGET: &str = "corral_script::context";

/// Step and allocation ceilings for one run. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    /// Maximum computation steps.
    pub max_steps: Option<u64>,
    /// Maximum estimated bytes allocated.
    pub max_allocs: Option<u64>,
}

impl Budget {
    /// A budget with no ceilings.
    pub const UNLIMITED: Self = Self {
        max_steps: None,
        max_allocs: None,
    };
}

/// State owned by one script execution.
///
/// Counters only ever grow and the required safety set only ever widens. The
/// context lives on the thread running the script; the [`CancelSignal`] it
/// carries is the only part shared with other threads.
#[derive(Debug)]
pub struct ExecutionContext {
    label: String,
    required: Cell<Safety>,
    steps: Cell<u64>,
    allocs: Cell<u64>,
    budget: Budget,
    cancel: CancelSignal,
}

impl ExecutionContext {
    /// Creates an unbounded context requiring no guarantees.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            required: Cell::new(Safety::NOT_SAFE),
            steps: Cell::new(0),
            allocs: Cell::new(0),
            budget: Budget::UNLIMITED,
            cancel: CancelSignal::new(),
        }
    }

    /// Applies step and allocation ceilings.
    #[must_use]
    pub const fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Uses `signal` for cancellation instead of a private one.
    #[must_use]
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = signal;
        self
    }

    /// Adds `safety` to the set every operation must provide.
    pub fn require_safety(&self, safety: Safety) {
        self.required.set(self.required.get().union(safety));
    }

    /// Label of the script being run.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Guarantees every operation must provide.
    #[must_use]
    pub fn required_safety(&self) -> Safety {
        self.required.get()
    }

    /// Steps charged so far.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps.get()
    }

    /// Estimated bytes charged so far.
    #[must_use]
    pub fn allocs(&self) -> u64 {
        self.allocs.get()
    }

    /// Configured ceilings.
    #[must_use]
    pub const fn budget(&self) -> Budget {
        self.budget
    }

    /// Cancellation signal observed by this context.
    #[must_use]
    pub const fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Cancels the run with `reason`.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel.cancel(reason);
    }

    /// Fails once the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), ScriptError> {
        self.cancel.check()
    }

    /// Verifies that an operation declaring `provides` may run here.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Capability`] naming the missing guarantees.
    pub fn check_safety(&self, operation: &str, provides: Safety) -> Result<(), ScriptError> {
        let required = self.required.get();
        if provides.permits(required) {
            return Ok(());
        }
        Err(ScriptError::Capability {
            operation: operation.to_owned(),
            missing: required.difference(provides),
        })
    }

    /// Charges `count` computation steps.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Cancelled`] once cancelled, or
    /// [`ScriptError::ResourceExceeded`] when the step ceiling is crossed.
    pub fn add_steps(&self, count: u64) -> Result<(), ScriptError> {
        self.cancel.check()?;
        let total = self.steps.get().saturating_add(count);
        self.steps.set(total);
        exceeds(Resource::Steps, total, self.budget.max_steps)
    }

    /// Charges `bytes` of estimated allocation.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Cancelled`] once cancelled, or
    /// [`ScriptError::ResourceExceeded`] when the allocation ceiling is
    /// crossed.
    pub fn add_allocs(&self, bytes: u64) -> Result<(), ScriptError> {
        self.cancel.check()?;
        let total = self.allocs.get().saturating_add(bytes);
        self.allocs.set(total);
        exceeds(Resource::Allocs, total, self.budget.max_allocs)
    }
}

fn exceeds(resource: Resource, total: u64, limit: Option<u64>) -> Result<(), ScriptError> {
    match limit {
        Some(limit) if total > limit => {
            trace!(target: CONTEXT_TARGET, %resource, total, limit, "budget exhausted");
            Err(ScriptError::ResourceExceeded { resource, limit })
        }
        _ => Ok(()),
    }
}
