//! Glue between host operations and the running script.
//!
//! Host functions registered on the runtime receive a
//! [`NativeCallContext`]. [`admit`] recovers the run's
//! [`ExecutionContext`] from it and checks the operation's declared
//! [`Safety`] before any work happens. Failures travel back through the
//! runtime as terminations, which scripts cannot catch, and are unwrapped into
//! the original [`ScriptError`] when the run ends.

use std::rc::Rc;

use rhai::{Dynamic, EvalAltResult, NativeCallContext, ParseError, Position};

use crate::context::ExecutionContext;
use crate::error::{Resource, ScriptError};
use crate::safety::Safety;

/// Result type returned by host functions registered on the runtime.
pub type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Per-run state carried in the runtime's tag.
#[derive(Debug, Clone)]
pub(crate) struct RunTag(pub(crate) Rc<ExecutionContext>);

/// Returns the context of the run that issued `call`, once `operation`
/// has been shown to provide every guarantee the context requires.
///
/// # Errors
///
/// Fails with [`ScriptError::Capability`] when `provides` falls short, and
/// with [`ScriptError::Internal`] when the call did not come from a run
/// started by [`Engine`](crate::Engine).
pub fn admit(
    call: &NativeCallContext<'_>,
    operation: &str,
    provides: Safety,
) -> HostResult<Rc<ExecutionContext>> {
    let ctx = context(call)?;
    ctx.check_safety(operation, provides).map_err(raise)?;
    Ok(ctx)
}

/// Returns the context of the run that issued `call`.
///
/// # Errors
///
/// Fails with [`ScriptError::Internal`] outside a run started by
/// [`Engine`](crate::Engine).
pub fn context(call: &NativeCallContext<'_>) -> HostResult<Rc<ExecutionContext>> {
    call.tag()
        .and_then(|tag| tag.clone().try_cast::<RunTag>())
        .map(|tag| tag.0)
        .ok_or_else(|| {
            raise(ScriptError::Internal {
                message: "host function called outside a script run".to_owned(),
            })
        })
}

/// Wraps `error` so that it ends the run and survives the trip back to the
/// engine unchanged.
#[must_use]
pub fn raise(error: ScriptError) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorTerminated(
        Dynamic::from(error),
        Position::NONE,
    ))
}

/// Converts a compilation failure into [`ScriptError::Syntax`].
pub(crate) fn syntax_error(label: &str, error: &ParseError) -> ScriptError {
    let position = error.position();
    ScriptError::Syntax {
        label: label.to_owned(),
        line: line_of(position).unwrap_or(0),
        column: position
            .position()
            .and_then(|column| u32::try_from(column).ok())
            .unwrap_or(0),
        message: error.err_type().to_string(),
    }
}

/// Converts a runtime failure into the [`ScriptError`] it stands for.
pub(crate) fn runtime_error(ctx: &ExecutionContext, error: EvalAltResult) -> ScriptError {
    match error {
        EvalAltResult::ErrorTerminated(token, position) => {
            token.try_cast::<ScriptError>().unwrap_or_else(|| {
                ScriptError::runtime_at("run terminated", ctx.label(), line_of(position))
            })
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _)
        | EvalAltResult::ErrorInModule(_, inner, _) => runtime_error(ctx, *inner),
        EvalAltResult::ErrorParsing(kind, position) => {
            syntax_error(ctx.label(), &ParseError(Box::new(kind), position))
        }
        EvalAltResult::ErrorDataTooLarge(..) => ScriptError::ResourceExceeded {
            resource: Resource::Allocs,
            limit: ctx.budget().max_allocs.unwrap_or(u64::MAX),
        },
        EvalAltResult::ErrorTooManyOperations(..) => ScriptError::ResourceExceeded {
            resource: Resource::Steps,
            limit: ctx.budget().max_steps.unwrap_or(u64::MAX),
        },
        EvalAltResult::ErrorRuntime(value, _) => match value.try_cast_result::<ScriptError>() {
            Ok(error) => error,
            Err(value) => ScriptError::Failed {
                message: value.to_string(),
            },
        },
        mut other => {
            let line = line_of(other.take_position());
            ScriptError::runtime_at(other.to_string(), ctx.label(), line)
        }
    }
}

fn line_of(position: Position) -> Option<u32> {
    position.line().and_then(|line| u32::try_from(line).ok())
}
