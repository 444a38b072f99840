// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # cmdforge
//!
//! An interactive command dispatcher whose users can define new commands at
//! runtime. Submitted source text is compiled by a sandboxed loader,
//! registered next to the built-in commands, and persisted so it survives a
//! restart.
//!
//! ## Architecture
//!
//! - **Handlers** (`handler`): the `Handler` trait and explicit signatures
//! - **Sandboxed loader** (`script`): closed-grammar interpreter with a call
//!   allow-list and a per-invocation step budget
//! - **Store** (`store`): atomic JSON persistence of custom commands
//! - **Registry** (`registry`): case-insensitive names and aliases → shared entries
//! - **Dispatcher** (`dispatch`): arity-checked invocation
//! - **Host** (`builtins`, `shell`, `config`, `paths`): built-in commands,
//!   the REPL and its configuration
//!
//! ## Library usage
//!
//! ```
//! use cmdforge::dispatch::Dispatcher;
//! use cmdforge::registry::CommandRegistry;
//! use cmdforge::script::{ScriptLoader, Value};
//!
//! let mut registry = CommandRegistry::new(ScriptLoader::default());
//! registry.define("square", "fn square(x) { return x * x; }", None).unwrap();
//!
//! let args = vec!["4".to_string()];
//! let result = Dispatcher::new(&registry)
//!     .invoke("square", &args, &mut std::io::sink())
//!     .unwrap();
//! assert_eq!(result, Some(Value::Int(16)));
//! ```

pub mod builtins;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod paths;
pub mod registry;
pub mod script;
pub mod shell;
pub mod store;
