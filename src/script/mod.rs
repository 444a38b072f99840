//! Sandboxed loader: source text → callable command handler.
//!
//! A submission must define exactly one function in a small closed grammar:
//!
//! ```text
//! fn square(x) { return x * x; }
//! fn square(x) = x * x
//! ```
//!
//! # Pipeline
//!
//! 1. [`lexer`] tokenizes, tracking line/column for diagnostics; sources
//!    over [`MAX_SOURCE_LEN`] bytes are refused first
//! 2. [`parser`] builds [`ast::Function`]s, nested at most
//!    [`parser::MAX_DEPTH`] levels; exactly one is required
//! 3. [`check`] resolves variables and restricts calls to the [`sandbox`]
//!    allow-list
//! 4. The arity limit ([`MAX_ARITY`]) is enforced
//! 5. The function is wrapped as a [`ScriptFunction`] that [`interp`]
//!    executes under a per-call step budget
//!
//! Nothing here touches registry state; loading is a pure function of the
//! source text plus the loader's sandbox settings.

pub mod ast;
pub mod check;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod sandbox;
pub mod value;

use std::fmt;
use std::io::Write;
use std::rc::Rc;

pub use error::{CompileError, CompileResult, LoadError, LoadResult, ScriptError, ScriptResult};
pub use lexer::is_incomplete;
pub use sandbox::{DEFAULT_MAX_STEPS, DEFAULT_MAX_STRING_LEN, Primitive, Sandbox};
pub use value::Value;

use crate::error::ValidationError;
use crate::handler::{self, Handler, HandlerResult, Signature};

/// Maximum number of parameters a script handler may declare.
pub const MAX_ARITY: usize = 5;

/// Longest source text, in bytes, the loader accepts.
pub const MAX_SOURCE_LEN: usize = 64 * 1024;

/// A compiled script function, ready to be registered as a command handler.
pub struct ScriptFunction {
    signature: Signature,
    function: ast::Function,
    sandbox: Rc<Sandbox>,
}

impl ScriptFunction {
    pub fn name(&self) -> &str {
        &self.signature.name
    }
}

impl Handler for ScriptFunction {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, args: &[String], out: &mut dyn Write) -> HandlerResult {
        handler::check_arity(&self.signature, args)?;
        let values = args.iter().map(|a| Value::from_token(a)).collect();
        Ok(interp::call(&self.function, values, &self.sandbox, out)?)
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Output of [`ScriptLoader::load`].
#[derive(Debug)]
pub struct LoadedScript {
    /// Name of the function as written in the source.
    pub name: String,
    pub handler: ScriptFunction,
    pub arity: usize,
}

/// Compiles submitted source text into [`ScriptFunction`]s.
///
/// All functions produced by one loader share its [`Sandbox`] (random source
/// and step budget).
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    sandbox: Rc<Sandbox>,
}

impl ScriptLoader {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox: Rc::new(sandbox),
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Compile `source` into a handler.
    ///
    /// Fails with [`CompileError`] unless the text parses and defines exactly
    /// one function that passes the sandbox checks, and with
    /// [`ValidationError::TooManyParameters`] if it declares more than
    /// [`MAX_ARITY`] parameters.
    pub fn load(&self, source: &str) -> LoadResult<LoadedScript> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(CompileError::SourceTooLong {
                len: source.len(),
                max: MAX_SOURCE_LEN,
            }
            .into());
        }
        let mut functions = parser::parse_program(source)?;
        let function = match functions.len() {
            0 => return Err(CompileError::NoFunction.into()),
            1 => functions.remove(0),
            count => {
                let names = functions
                    .iter()
                    .map(|f| f.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(CompileError::MultipleFunctions { count, names }.into());
            }
        };

        check::check_function(&function)?;

        let arity = function.params.len();
        if arity > MAX_ARITY {
            return Err(ValidationError::TooManyParameters {
                function: function.name.clone(),
                arity,
                max: MAX_ARITY,
            }
            .into());
        }

        let signature = Signature {
            name: function.name.clone(),
            params: function.params.clone(),
        };
        tracing::debug!(function = %signature.name, arity, "compiled script handler");

        Ok(LoadedScript {
            name: signature.name.clone(),
            handler: ScriptFunction {
                signature,
                function,
                sandbox: Rc::clone(&self.sandbox),
            },
            arity,
        })
    }
}

impl Default for ScriptLoader {
    fn default() -> Self {
        Self::new(Sandbox::default())
    }
}
