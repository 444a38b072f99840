//! Arity-checked command dispatch.
//!
//! [`Dispatcher::invoke`] resolves a name through the registry, checks the
//! argument count against the handler signature, and only then runs the
//! handler. Failures are classified into [`DispatchError`] variants; none of
//! them is fatal to the caller's loop.

use std::io::Write;

use miette::Diagnostic;
use thiserror::Error;

use crate::registry::CommandRegistry;
use crate::script::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error("command '{name}' not found")]
    #[diagnostic(
        code(cmdforge::dispatch::not_found),
        help("Type `help` to list the available commands, or `define` a new one.")
    )]
    NotFound { name: String },

    #[error("'{command}' takes {expected} argument(s), got {actual}")]
    #[diagnostic(code(cmdforge::dispatch::arity), help("Usage: {usage}"))]
    Arity {
        command: String,
        expected: usize,
        actual: usize,
        usage: String,
    },

    #[error("error executing '{command}': {message}")]
    #[diagnostic(
        code(cmdforge::dispatch::handler),
        help("The command ran but failed. Check the arguments, or `help {command}` for usage.")
    )]
    Handler { command: String, message: String },
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// A parsed input line: command name plus raw argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Split `line` on whitespace. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace().map(str::to_string);
        let name = tokens.next()?;
        Some(Self {
            name,
            args: tokens.collect(),
        })
    }
}

/// Invokes registry entries by name.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'a> {
    registry: &'a CommandRegistry,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a CommandRegistry) -> Self {
        Self { registry }
    }

    /// Run `name` with `args`. A `nil` result is returned as `None`.
    ///
    /// The handler is never called when the argument count differs from
    /// its arity.
    pub fn invoke(
        &self,
        name: &str,
        args: &[String],
        out: &mut dyn Write,
    ) -> DispatchResult<Option<Value>> {
        let entry = self
            .registry
            .resolve(name)
            .ok_or_else(|| DispatchError::NotFound {
                name: name.to_string(),
            })?;

        let expected = entry.arity();
        if args.len() != expected {
            return Err(DispatchError::Arity {
                command: entry.name().to_string(),
                expected,
                actual: args.len(),
                usage: entry.usage(),
            });
        }

        tracing::debug!(command = entry.name(), args = args.len(), "invoking command");
        match entry.handler().invoke(args, out) {
            Ok(Value::Nil) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(fault) => {
                tracing::debug!(command = entry.name(), error = %fault, "command failed");
                Err(DispatchError::Handler {
                    command: entry.name().to_string(),
                    message: fault.message,
                })
            }
        }
    }

    /// Parse and run a raw input line. Blank lines do nothing.
    pub fn invoke_line(&self, line: &str, out: &mut dyn Write) -> DispatchResult<Option<Value>> {
        match Invocation::parse(line) {
            Some(invocation) => self.invoke(&invocation.name, &invocation.args, out),
            None => Ok(None),
        }
    }
}
