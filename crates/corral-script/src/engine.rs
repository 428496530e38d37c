//! Script execution entry points.
//!
//! [`Engine`] fixes the dialect and the limits applied to every run. Each
//! run gets a fresh [`ExecutionContext`] that requires [`REQUIRED_SAFETY`],
//! so any host operation the script reaches must declare bounded CPU, memory,
//! and time. The first error ends the run.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rhai::packages::{
    ArithmeticPackage, BasicArrayPackage, BasicFnPackage, BasicIteratorPackage,
    BasicMapPackage, BasicMathPackage, BasicStringPackage, LogicPackage, MoreStringPackage,
    Package,
};
use rhai::{Dynamic, Position};
use tracing::{debug, info};

use crate::cancel::{CancelSignal, DeadlineTimer};
use crate::context::{Budget, ExecutionContext};
use crate::dialect::DialectOptions;
use crate::error::ScriptError;
use crate::host::{RunTag, runtime_error, syntax_error};
use crate::namespace::Namespace;
use crate::safety::Safety;
use crate::size;

const ENGINE_TARGET: &str = "corral_script::engine";
const PRINT_TARGET: &str = "corral_script::print";

/// Guarantees every operation reachable from a script must declare.
pub const REQUIRED_SAFETY: Safety = Safety::CPU.union(Safety::MEM).union(Safety::TIME);

/// Longest string a script may build when the allocation budget is unbounded.
pub const MAX_STRING_BYTES: u64 = 1 << 30;

/// Most elements an array or map may hold when the allocation budget is
/// unbounded.
pub const MAX_COLLECTION_LEN: u64 = 1 << 24;

/// Ceilings applied to each run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Step and allocation budget.
    pub budget: Budget,
    /// Wall-clock limit enforced by a [`DeadlineTimer`].
    pub timeout: Option<Duration>,
}

impl Limits {
    /// Ten million steps, 256 MiB of allocations and thirty seconds.
    pub const DEFAULT: Self = Self {
        budget: Budget {
            max_steps: Some(10_000_000),
            max_allocs: Some(256 * 1024 * 1024),
        },
        timeout: Some(Duration::from_secs(30)),
    };

    /// No budget and no deadline. Values are still capped at
    /// [`MAX_STRING_BYTES`] and [`MAX_COLLECTION_LEN`].
    pub const UNLIMITED: Self = Self {
        budget: Budget::UNLIMITED,
        timeout: None,
    };
}

impl Default for Limits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Counters observed at the end of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Steps charged.
    pub steps: u64,
    /// Estimated bytes charged.
    pub allocs: u64,
}

/// Runs scripts under a fixed dialect and fixed limits.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    limits: Limits,
    dialect: DialectOptions,
}

impl Engine {
    /// Engine with the default dialect and [`Limits::DEFAULT`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `limits` to every run.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Overrides the dialect.
    #[must_use]
    pub const fn with_dialect(mut self, dialect: DialectOptions) -> Self {
        self.dialect = dialect;
        self
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> Limits {
        self.limits
    }

    /// Configured dialect.
    #[must_use]
    pub const fn dialect(&self) -> DialectOptions {
        self.dialect
    }

    /// Runs `script` against `namespace`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScriptError`] raised while compiling or
    /// evaluating.
    pub fn run(
        &self,
        label: &str,
        namespace: &Namespace,
        script: &str,
    ) -> Result<RunReport, ScriptError> {
        self.run_with_signal(label, namespace, script, CancelSignal::new())
    }

    /// Runs `script` observing `signal`, which the host may cancel from
    /// another thread.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScriptError`] raised while compiling or
    /// evaluating, including [`ScriptError::Cancelled`] when `signal` fires
    /// or the configured timeout passes.
    pub fn run_with_signal(
        &self,
        label: &str,
        namespace: &Namespace,
        script: &str,
        signal: CancelSignal,
    ) -> Result<RunReport, ScriptError> {
        let ctx = Rc::new(
            ExecutionContext::new(label)
                .with_budget(self.limits.budget)
                .with_cancel_signal(signal),
        );
        let _timer = self
            .limits
            .timeout
            .map(|timeout| DeadlineTimer::arm(ctx.cancel_signal(), timeout))
            .transpose()?;
        let started = Instant::now();
        debug!(
            target: ENGINE_TARGET,
            label,
            names = namespace.len(),
            "script run starting"
        );
        let outcome = self.execute(&ctx, namespace, script);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &outcome {
            Ok(()) => debug!(
                target: ENGINE_TARGET,
                label,
                steps = ctx.steps(),
                allocs = ctx.allocs(),
                elapsed_ms,
                "script run finished"
            ),
            Err(error) => debug!(
                target: ENGINE_TARGET,
                label,
                steps = ctx.steps(),
                allocs = ctx.allocs(),
                elapsed_ms,
                %error,
                "script run failed"
            ),
        }
        outcome.map(|()| RunReport {
            steps: ctx.steps(),
            allocs: ctx.allocs(),
        })
    }

    /// Compiles and evaluates `script` inside an existing context.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScriptError`] raised while compiling or
    /// evaluating.
    pub fn execute(
        &self,
        ctx: &Rc<ExecutionContext>,
        namespace: &Namespace,
        script: &str,
    ) -> Result<(), ScriptError> {
        ctx.check_cancelled()?;
        ctx.require_safety(REQUIRED_SAFETY);
        let runtime = self.runtime(ctx, namespace);
        let mut scope = namespace.scope();
        let ast = runtime
            .compile_with_scope(&scope, script)
            .map_err(|error| syntax_error(ctx.label(), &error))?;
        runtime
            .run_ast_with_scope(&mut scope, &ast)
            .map_err(|error| runtime_error(ctx, *error))?;
        ctx.check_cancelled()
    }

    /// Builds the single-use runtime for one run.
    fn runtime(&self, ctx: &Rc<ExecutionContext>, namespace: &Namespace) -> rhai::Engine {
        let mut runtime = rhai::Engine::new_raw();
        ArithmeticPackage::new().register_into_engine(&mut runtime);
        LogicPackage::new().register_into_engine(&mut runtime);
        BasicStringPackage::new().register_into_engine(&mut runtime);
        MoreStringPackage::new().register_into_engine(&mut runtime);
        BasicArrayPackage::new().register_into_engine(&mut runtime);
        BasicMapPackage::new().register_into_engine(&mut runtime);
        BasicIteratorPackage::new().register_into_engine(&mut runtime);
        BasicMathPackage::new().register_into_engine(&mut runtime);
        BasicFnPackage::new().register_into_engine(&mut runtime);
        self.dialect.apply(&mut runtime);
        apply_value_limits(&mut runtime, ctx.budget());
        runtime.set_default_tag(Dynamic::from(RunTag(Rc::clone(ctx))));

        let metered = Rc::clone(ctx);
        let charged = Cell::new(0_u64);
        runtime.on_progress(move |operations| {
            let delta = operations.saturating_sub(charged.replace(operations));
            metered.add_steps(delta).err().map(Dynamic::from)
        });

        let label = ctx.label().to_owned();
        runtime.on_print(move |text| {
            info!(target: PRINT_TARGET, script = %label, "{text}");
        });
        let label = ctx.label().to_owned();
        runtime.on_debug(move |text, _source, position: Position| {
            debug!(
                target: PRINT_TARGET,
                script = %label,
                line = position.line(),
                "{text}"
            );
        });

        namespace.install(&mut runtime);
        runtime
    }
}

/// Caps individual values so no single string, array, or map can outgrow the
/// allocation budget.
fn apply_value_limits(runtime: &mut rhai::Engine, budget: Budget) {
    let string_bytes = budget
        .max_allocs
        .map_or(MAX_STRING_BYTES, |limit| limit.min(MAX_STRING_BYTES));
    let collection_len = budget.max_allocs.map_or(MAX_COLLECTION_LEN, |limit| {
        limit
            .checked_div(size::VALUE_SLOT)
            .unwrap_or(0)
            .clamp(1, MAX_COLLECTION_LEN)
    });
    runtime
        .set_max_string_size(to_usize(string_bytes))
        .set_max_array_size(to_usize(collection_len))
        .set_max_map_size(to_usize(collection_len));
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX).max(1)
}

/// Runs `script` with the default engine and [`Limits::DEFAULT`].
///
/// # Errors
///
/// Returns the first [`ScriptError`] raised while compiling or evaluating.
pub fn run(label: &str, namespace: &Namespace, script: &str) -> Result<(), ScriptError> {
    Engine::new().run(label, namespace, script).map(|_| ())
}
