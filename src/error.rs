//! Rich diagnostic error types for cmdforge.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know what went wrong and how to
//! fix it. [`ForgeError`] wraps them all for the command-line front end.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::paths::PathError;
use crate::script::{CompileError, LoadError};
use crate::shell::ShellError;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum ForgeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Shell(#[from] ShellError),
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("`{function}` declares {arity} parameters, the limit is {max}")]
    #[diagnostic(
        code(cmdforge::validation::too_many_parameters),
        help(
            "Custom commands take at most {max} positional arguments. \
             Combine inputs or split the command into several smaller ones."
        )
    )]
    TooManyParameters {
        function: String,
        arity: usize,
        max: usize,
    },

    #[error("invalid command name: \"{name}\"")]
    #[diagnostic(
        code(cmdforge::validation::invalid_name),
        help("Command names and aliases must be non-empty and contain no whitespace.")
    )]
    InvalidName { name: String },

    #[error("\"{name}\" is a built-in command")]
    #[diagnostic(
        code(cmdforge::validation::reserved_name),
        help("Built-in commands cannot be replaced, aliased over, or removed. Pick another name.")
    )]
    ReservedName { name: String },

    #[error("\"{name}\" already names the command \"{command}\"")]
    #[diagnostic(
        code(cmdforge::validation::name_in_use),
        help("An alias cannot shadow another command. Remove \"{command}\" first or pick another alias.")
    )]
    NameInUse { name: String, command: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error on command store {path}")]
    #[diagnostic(
        code(cmdforge::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command store {path} is not valid JSON: {message}")]
    #[diagnostic(
        code(cmdforge::store::parse),
        help(
            "The store must be a JSON object mapping command names to \
             {{description, sourceText, custom}} records. Fix or move the file; \
             cmdforge starts empty until then."
        )
    )]
    Parse { path: String, message: String },

    #[error("failed to encode command store: {message}")]
    #[diagnostic(code(cmdforge::store::encode))]
    Encode { message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("command not found: {name}")]
    #[diagnostic(
        code(cmdforge::registry::not_found),
        help("Run `list` to see the available commands.")
    )]
    NotFound { name: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    /// The in-memory change was applied but could not be saved.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl From<LoadError> for RegistryError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Compile(e) => Self::Compile(e),
            LoadError::Validation(e) => Self::Validation(e),
        }
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Convenience alias for functions returning any cmdforge error.
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;
