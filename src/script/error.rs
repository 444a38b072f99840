//! Diagnostic error types for the script subsystem.
//!
//! Compile-time problems ([`CompileError`]) are reported when source text is
//! submitted; runtime problems ([`ScriptError`]) surface when a compiled
//! handler is invoked.

use miette::Diagnostic;
use thiserror::Error;

use crate::error::ValidationError;

/// Errors raised while turning source text into a handler.
#[derive(Debug, Error, Diagnostic)]
pub enum CompileError {
    #[error("syntax error at {line}:{column}: {message}")]
    #[diagnostic(
        code(cmdforge::script::syntax),
        help(
            "Command source must be a single function, e.g. \
             `fn square(x) {{ return x * x; }}` or `fn square(x) = x * x`."
        )
    )]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("source is {len} bytes, the limit is {max}")]
    #[diagnostic(
        code(cmdforge::script::source_too_long),
        help("Command handlers are meant to be short. Split the work into several commands.")
    )]
    SourceTooLong { len: usize, max: usize },

    #[error("source does not define a function")]
    #[diagnostic(
        code(cmdforge::script::no_function),
        help("Submit exactly one `fn name(params) {{ ... }}` definition.")
    )]
    NoFunction,

    #[error("source defines {count} functions ({names}), expected exactly one")]
    #[diagnostic(
        code(cmdforge::script::multiple_functions),
        help("Each command is built from one function. Submit the others as separate commands.")
    )]
    MultipleFunctions { count: usize, names: String },

    #[error("parameter `{name}` is declared twice in `{function}`")]
    #[diagnostic(
        code(cmdforge::script::duplicate_parameter),
        help("Give every parameter a distinct name.")
    )]
    DuplicateParameter { function: String, name: String },

    #[error("undefined variable `{name}` at {line}:{column}")]
    #[diagnostic(
        code(cmdforge::script::undefined_variable),
        help("Declare the variable with `let {name} = ...;` before using it, or add it as a parameter.")
    )]
    UndefinedVariable {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("call to `{name}` at {line}:{column} is not allowed")]
    #[diagnostic(
        code(cmdforge::script::unknown_function),
        help(
            "Command handlers may only call: print, random, int, float, str, len, \
             abs, min, max, round, upper, lower."
        )
    )]
    UnknownFunction {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("`{name}` takes {expected} argument(s), got {actual} at {line}:{column}")]
    #[diagnostic(code(cmdforge::script::primitive_arity))]
    PrimitiveArity {
        name: String,
        expected: String,
        actual: usize,
        line: usize,
        column: usize,
    },
}

/// Result type for compilation.
pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Errors raised by a compiled handler while it runs.
#[derive(Debug, Error, Diagnostic)]
pub enum ScriptError {
    #[error("type error: {message}")]
    #[diagnostic(
        code(cmdforge::script::type_error),
        help("Convert values explicitly with int(), float() or str().")
    )]
    Type { message: String },

    #[error("division by zero")]
    #[diagnostic(code(cmdforge::script::division_by_zero))]
    DivisionByZero,

    #[error("integer overflow in `{op}`")]
    #[diagnostic(
        code(cmdforge::script::overflow),
        help("Use float() to work with values outside the 64-bit integer range.")
    )]
    Overflow { op: String },

    #[error("cannot convert \"{value}\" to {target}")]
    #[diagnostic(code(cmdforge::script::conversion))]
    Conversion { value: String, target: String },

    #[error("step limit of {limit} exceeded")]
    #[diagnostic(
        code(cmdforge::script::step_limit),
        help("The handler ran too long, most likely an endless `while` loop.")
    )]
    StepLimit { limit: u64 },

    #[error("string of {len} bytes exceeds the limit of {limit}")]
    #[diagnostic(
        code(cmdforge::script::resource_limit),
        help("The handler built a string larger than the sandbox allows, most likely by doubling it in a loop.")
    )]
    ResourceLimit { len: usize, limit: usize },

    #[error("failed to write output")]
    #[diagnostic(code(cmdforge::script::output))]
    Output {
        #[source]
        source: std::io::Error,
    },
}

/// Result type for script execution.
pub type ScriptResult<T> = std::result::Result<T, ScriptError>;

/// Errors from [`ScriptLoader::load`](super::ScriptLoader::load).
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),
}

pub type LoadResult<T> = std::result::Result<T, LoadError>;
