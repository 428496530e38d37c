//! The restricted language dialect scripts are compiled under.
//!
//! Scripts run on the `rhai` runtime. The dialect decides which of its
//! syntactic features a script may use and how deep expressions and calls may
//! nest. Module loading and dynamic evaluation are always refused, so the only
//! code a run can reach is the script text and the host's namespace.

/// Keywords refused under every dialect.
pub const DENIED_KEYWORDS: [&str; 3] = ["import", "export", "eval"];

/// Default limit on nested function calls.
pub const MAX_CALL_DEPTH: usize = 8;
/// Default limit on expression nesting at the top level.
pub const MAX_EXPR_DEPTH: usize = 32;
/// Default limit on expression nesting inside function bodies.
pub const MAX_FUNCTION_EXPR_DEPTH: usize = 16;

/// Toggles and nesting limits for optional language features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectOptions {
    /// Permit `while`, `loop`, `do` and `for` loops.
    pub looping: bool,
    /// Permit `fn` definitions.
    pub functions: bool,
    /// Permit anonymous functions and closures.
    pub closures: bool,
    /// Permit `let` to rebind a name already in scope.
    pub shadowing: bool,
    /// Deepest chain of nested function calls, recursion included.
    pub max_call_depth: usize,
    /// Deepest expression nesting at the top level of the script.
    pub max_expr_depth: usize,
    /// Deepest expression nesting inside a function body.
    pub max_function_expr_depth: usize,
}

impl DialectOptions {
    /// Options used by the execution engine.
    pub const CORRAL: Self = Self {
        looping: true,
        functions: true,
        closures: false,
        shadowing: true,
        max_call_depth: MAX_CALL_DEPTH,
        max_expr_depth: MAX_EXPR_DEPTH,
        max_function_expr_depth: MAX_FUNCTION_EXPR_DEPTH,
    };

    /// Straight-line scripts only: no loops, functions, closures or
    /// shadowing.
    pub const STRICT: Self = Self {
        looping: false,
        functions: false,
        closures: false,
        shadowing: false,
        ..Self::CORRAL
    };

    /// Applies the options to `engine`.
    pub(crate) fn apply(self, engine: &mut rhai::Engine) {
        engine
            .set_allow_looping(self.looping)
            .set_allow_loop_expressions(self.looping)
            .set_allow_anonymous_fn(self.closures)
            .set_allow_shadowing(self.shadowing)
            .set_max_call_levels(self.max_call_depth)
            .set_max_expr_depths(self.max_expr_depth, self.max_function_expr_depth);
        if !self.functions {
            engine.disable_symbol("fn");
        }
        for keyword in DENIED_KEYWORDS {
            engine.disable_symbol(keyword);
        }
    }
}

impl Default for DialectOptions {
    fn default() -> Self {
        Self::CORRAL
    }
}
