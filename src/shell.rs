//! Interactive read-eval loop.
//!
//! Lines starting with a meta command (`help`, `list`, `define`, `alias`,
//! `describe`, `remove`, `exit`, `quit`) are handled here; everything else is
//! passed to the [`Dispatcher`]. Errors are rendered as miette reports and
//! never end the loop.

use std::io::Write;
use std::path::PathBuf;

use miette::Diagnostic;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;

use crate::dispatch::Dispatcher;
use crate::registry::CommandRegistry;
use crate::script::is_incomplete;

/// Words the shell consumes before dispatch.
pub const META_COMMANDS: &[&str] = &[
    "help", "list", "define", "alias", "describe", "remove", "exit", "quit",
];

#[derive(Debug, Error, Diagnostic)]
pub enum ShellError {
    #[error("line editor failed: {message}")]
    #[diagnostic(
        code(cmdforge::shell::readline),
        help("The terminal could not be read. Use `cmdforge run` for non-interactive use.")
    )]
    Readline { message: String },

    #[error("failed to write shell output")]
    #[diagnostic(code(cmdforge::shell::output))]
    Output {
        #[source]
        source: std::io::Error,
    },
}

impl From<ReadlineError> for ShellError {
    fn from(e: ReadlineError) -> Self {
        Self::Readline {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for ShellError {
    fn from(source: std::io::Error) -> Self {
        Self::Output { source }
    }
}

pub type ShellResult<T> = std::result::Result<T, ShellError>;

/// Source of input lines.
pub trait Reader {
    /// Read the next command line. `None` ends the session.
    fn next_line(&mut self, prompt: &str) -> ShellResult<Option<String>>;

    /// Read a continuation line of a multi-line `define`.
    fn more_line(&mut self) -> ShellResult<Option<String>>;

    /// Remember a completed entry.
    fn add_history(&mut self, _entry: &str) {}

    /// Called once when the session ends.
    fn finish(&mut self) {}
}

/// Line-edited terminal input with persistent history.
pub struct PromptReader {
    editor: DefaultEditor,
    history: Option<PathBuf>,
}

impl PromptReader {
    pub fn new(history: Option<PathBuf>) -> ShellResult<Self> {
        let mut editor = DefaultEditor::new()?;
        if let Some(path) = &history {
            // A missing history file is normal on first run.
            if let Err(e) = editor.load_history(path) {
                tracing::debug!(path = %path.display(), error = %e, "no shell history loaded");
            }
        }
        Ok(Self { editor, history })
    }
}

impl Reader for PromptReader {
    fn next_line(&mut self, prompt: &str) -> ShellResult<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn more_line(&mut self) -> ShellResult<Option<String>> {
        match self.editor.readline("... ") {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn add_history(&mut self, entry: &str) {
        let _ = self.editor.add_history_entry(entry);
    }

    fn finish(&mut self) {
        let Some(path) = &self.history else { return };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = self.editor.save_history(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save shell history");
        }
    }
}

/// Reads from a fixed list of lines. Used for piped input and tests.
#[derive(Debug, Default)]
pub struct LineReader {
    lines: std::collections::VecDeque<String>,
}

impl LineReader {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl Reader for LineReader {
    fn next_line(&mut self, _prompt: &str) -> ShellResult<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn more_line(&mut self) -> ShellResult<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

enum Flow {
    Continue,
    Exit,
}

/// The interactive session: a registry driven by a [`Reader`].
pub struct Shell<R> {
    registry: CommandRegistry,
    reader: R,
    prompt: String,
}

impl<R: Reader> Shell<R> {
    pub fn new(registry: CommandRegistry, reader: R, prompt: impl Into<String>) -> Self {
        Self {
            registry,
            reader,
            prompt: prompt.into(),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> CommandRegistry {
        self.registry
    }

    /// Run until `exit`, `quit` or end of input.
    pub fn run(&mut self, out: &mut dyn Write) -> ShellResult<()> {
        for warning in self.registry.load_warnings() {
            writeln!(out, "warning: {warning}")?;
        }
        writeln!(out, "Type 'help' for available commands, 'exit' to leave.")?;

        let result = self.read_loop(out);
        self.reader.finish();
        result
    }

    fn read_loop(&mut self, out: &mut dyn Write) -> ShellResult<()> {
        while let Some(line) = self.reader.next_line(&self.prompt)? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.reader.add_history(line);
            if let Flow::Exit = self.handle(line, out)? {
                writeln!(out, "Exiting.")?;
                break;
            }
        }
        Ok(())
    }

    fn handle(&mut self, line: &str, out: &mut dyn Write) -> ShellResult<Flow> {
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "exit" | "quit" => return Ok(Flow::Exit),
            "help" if rest.is_empty() => self.help(out)?,
            "help" => match self.registry.describe(rest) {
                Some(text) => writeln!(out, "{text}")?,
                None => writeln!(out, "No help found for '{rest}'.")?,
            },
            "list" => self.list(out)?,
            "define" => self.define(rest, out)?,
            "alias" => match rest.split_whitespace().collect::<Vec<_>>()[..] {
                [alias, target] => match self.registry.alias(alias, target) {
                    Ok(entry) => writeln!(out, "'{alias}' now runs '{}'.", entry.name())?,
                    Err(e) => report(out, e)?,
                },
                _ => writeln!(out, "usage: alias <alias> <command>")?,
            },
            "describe" => match rest.split_once(char::is_whitespace) {
                Some((name, text)) => match self.registry.set_description(name, text.trim()) {
                    Ok(entry) => writeln!(out, "Updated '{}'.", entry.name())?,
                    Err(e) => report(out, e)?,
                },
                None => writeln!(out, "usage: describe <command> <text>")?,
            },
            "remove" if !rest.is_empty() => match self.registry.remove(rest) {
                Ok(true) => writeln!(out, "Removed '{rest}'.")?,
                Ok(false) => writeln!(out, "No command named '{rest}'.")?,
                Err(e) => report(out, e)?,
            },
            "remove" => writeln!(out, "usage: remove <command>")?,
            _ => match Dispatcher::new(&self.registry).invoke_line(line, out) {
                Ok(Some(value)) => writeln!(out, "{value}")?,
                Ok(None) => {}
                Err(e) => report(out, e)?,
            },
        }
        Ok(Flow::Continue)
    }

    fn help(&self, out: &mut dyn Write) -> ShellResult<()> {
        let entries = self.registry.list();
        if entries.is_empty() {
            writeln!(out, "No commands available.")?;
        } else {
            writeln!(out, "Available commands:")?;
            for (name, entry) in entries {
                writeln!(out, "- {name}: {}", entry.description())?;
            }
        }
        writeln!(out, "Shell commands: {}", META_COMMANDS.join(", "))?;
        Ok(())
    }

    fn list(&self, out: &mut dyn Write) -> ShellResult<()> {
        for (_, entry) in self.registry.list() {
            let origin = if entry.is_custom() { "custom" } else { "built-in" };
            writeln!(out, "{:<24} {:<8} {}", entry.usage(), origin, entry.description())?;
        }
        Ok(())
    }

    /// `define <name> <source>`, reading continuation lines until braces balance.
    fn define(&mut self, rest: &str, out: &mut dyn Write) -> ShellResult<()> {
        let Some((name, first)) = rest.split_once(char::is_whitespace) else {
            writeln!(out, "usage: define <name> <source>")?;
            return Ok(());
        };
        if META_COMMANDS.contains(&name.to_lowercase().as_str()) {
            writeln!(out, "'{name}' is a shell command and cannot be redefined.")?;
            return Ok(());
        }

        let mut source = first.trim().to_string();
        while is_incomplete(&source) {
            match self.reader.more_line()? {
                Some(line) => {
                    source.push('\n');
                    source.push_str(&line);
                }
                None => {
                    writeln!(out, "Definition of '{name}' abandoned.")?;
                    return Ok(());
                }
            }
        }

        match self.registry.define(name, &source, None) {
            Ok(entry) => writeln!(
                out,
                "Defined '{}' ({} argument(s)).",
                entry.name(),
                entry.arity()
            )?,
            Err(e) => report(out, e)?,
        }
        Ok(())
    }
}

fn report(out: &mut dyn Write, error: impl Diagnostic + Send + Sync + 'static) -> ShellResult<()> {
    writeln!(out, "{:?}", miette::Report::new(error))?;
    Ok(())
}
