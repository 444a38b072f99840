//! Handler abstraction shared by built-in and script commands.
//!
//! Every handler carries an explicit [`Signature`]; the arity used by the
//! dispatcher is read from it rather than discovered at run time.

use std::fmt;
use std::io::Write;

use miette::Diagnostic;
use thiserror::Error;

use crate::script::{ScriptError, Value};

/// A handler's name and positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<String>,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Number of positional arguments the handler requires.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Usage line for `command`, e.g. `add <a> <b>`.
    pub fn usage(&self, command: &str) -> String {
        let mut usage = command.to_string();
        for param in &self.params {
            usage.push_str(&format!(" <{param}>"));
        }
        usage
    }
}

/// Failure raised by a handler while it runs.
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(cmdforge::handler::fault))]
pub struct HandlerFault {
    pub message: String,
}

impl HandlerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ScriptError> for HandlerFault {
    fn from(e: ScriptError) -> Self {
        Self::new(e.to_string())
    }
}

/// Result of a handler invocation. [`Value::Nil`] means "no result".
pub type HandlerResult = std::result::Result<Value, HandlerFault>;

/// Something the dispatcher can invoke.
pub trait Handler {
    /// Describe this handler's interface.
    fn signature(&self) -> &Signature;

    /// Run with exactly `signature().arity()` raw argument tokens.
    /// Output meant for the user goes to `out`.
    fn invoke(&self, args: &[String], out: &mut dyn Write) -> HandlerResult;
}

/// Number of positional parameters `handler` accepts.
pub fn arity(handler: &dyn Handler) -> usize {
    handler.signature().arity()
}

/// Reject an argument list that does not match `signature`.
///
/// The dispatcher checks arity before invoking; this guards direct callers.
pub fn check_arity(signature: &Signature, args: &[String]) -> Result<(), HandlerFault> {
    let arity = signature.arity();
    if args.len() != arity {
        return Err(HandlerFault::new(format!(
            "`{}` takes {arity} argument(s), got {}",
            signature.name,
            args.len()
        )));
    }
    Ok(())
}

type NativeFn = dyn Fn(&[String], &mut dyn Write) -> HandlerResult;

/// A handler implemented in Rust by the host.
pub struct NativeHandler {
    signature: Signature,
    func: Box<NativeFn>,
}

impl NativeHandler {
    pub fn new<F>(name: &str, params: &[&str], func: F) -> Self
    where
        F: Fn(&[String], &mut dyn Write) -> HandlerResult + 'static,
    {
        Self {
            signature: Signature::new(name, params),
            func: Box::new(func),
        }
    }
}

impl Handler for NativeHandler {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, args: &[String], out: &mut dyn Write) -> HandlerResult {
        check_arity(&self.signature, args)?;
        (self.func)(args, out)
    }
}

impl fmt::Debug for NativeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandler")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}
