//! Shared helpers for scripting tests.

use std::cell::RefCell;
use std::rc::Rc;

use rhai::{Dynamic, NativeCallContext};

use crate::{
    Engine, HostObject, HostResult, Limits, Namespace, RunReport, Safety, ScriptError, admit,
};

/// Values recorded by the `emit` function, rendered with `Display`.
pub(crate) type Emitted = Rc<RefCell<Vec<String>>>;

/// Namespace holding an `emit(value)` function that records its argument.
pub(crate) fn emitting_namespace() -> (Namespace, Emitted) {
    let emitted: Emitted = Rc::default();
    let sink = Rc::clone(&emitted);
    let mut namespace = Namespace::new();
    namespace.register_functions(move |engine| {
        let sink = Rc::clone(&sink);
        engine.register_fn("emit", move |value: Dynamic| {
            sink.borrow_mut().push(value.to_string());
        });
    });
    (namespace, emitted)
}

/// Runs `script` with an `emit` function and returns what it recorded.
pub(crate) fn emitted_by(script: &str) -> Result<Vec<String>, ScriptError> {
    let (namespace, emitted) = emitting_namespace();
    Engine::new().run("test.rhai", &namespace, script)?;
    let values = emitted.borrow().clone();
    Ok(values)
}

/// Runs `script` with an empty namespace and unlimited budgets.
pub(crate) fn run_plain(script: &str) -> Result<RunReport, ScriptError> {
    Engine::new()
        .with_limits(Limits::UNLIMITED)
        .run("test.rhai", &Namespace::new(), script)
}

/// Host object whose `open()` method declares a fixed safety set.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Gate(pub(crate) Safety);

impl HostObject for Gate {
    fn register(engine: &mut rhai::Engine) {
        engine
            .register_type_with_name::<Self>("Gate")
            .register_fn("open", open_gate);
    }
}

fn open_gate(call: NativeCallContext<'_>, gate: Gate) -> HostResult<bool> {
    let ctx = admit(&call, "Gate.open", gate.0)?;
    ctx.add_steps(1).map_err(crate::raise)?;
    Ok(true)
}
