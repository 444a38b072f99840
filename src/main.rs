//! cmdforge CLI: interactive command dispatcher with user-defined commands.

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;

use cmdforge::builtins::register_builtins;
use cmdforge::config::ForgeConfig;
use cmdforge::dispatch::Dispatcher;
use cmdforge::error::ForgeResult;
use cmdforge::paths::ForgePaths;
use cmdforge::registry::CommandRegistry;
use cmdforge::script::{Sandbox, ScriptLoader};
use cmdforge::shell::{LineReader, PromptReader, Shell, ShellError};
use cmdforge::store::CommandStore;

#[derive(Parser)]
#[command(
    name = "cmdforge",
    version,
    about = "Interactive command dispatcher with user-defined commands"
)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/cmdforge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Command store file (default: $XDG_DATA_HOME/cmdforge/commands.json).
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Seed for `random()` and `roll`, for reproducible sessions.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Interpreter step budget per invocation.
    #[arg(long, global = true)]
    max_steps: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive shell (default).
    Repl,

    /// Run one command and exit.
    Run {
        /// Command name or alias.
        name: String,
        /// Argument tokens.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List registered commands.
    List,

    /// Define a custom command from source text.
    Define {
        name: String,
        /// Source of exactly one function, e.g. "fn square(x) = x * x".
        source: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove a custom command.
    Remove { name: String },

    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with the default settings.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();
    run(cli)?;
    Ok(())
}

fn run(cli: Cli) -> ForgeResult<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ForgePaths::resolve()?.config_file(),
    };

    if let Some(Commands::Config {
        action: ConfigAction::Init { force },
    }) = &cli.command
    {
        if ForgeConfig::init(&config_path, *force)? {
            println!("Wrote {}", config_path.display());
        } else {
            println!("{} already exists (use --force to overwrite)", config_path.display());
        }
        return Ok(());
    }
    let config = if cli.config.is_some() {
        ForgeConfig::load(&config_path)?
    } else {
        ForgeConfig::load_or_default(&config_path)?
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let store_path = match cli.store.or_else(|| config.store_path.clone()) {
        Some(path) => path,
        None => ForgePaths::resolve()?.store_file(),
    };
    let seed = cli.seed.or(config.seed);
    let max_steps = cli.max_steps.unwrap_or(config.max_steps);

    let loader =
        ScriptLoader::new(Sandbox::new(max_steps, seed).with_max_string_len(config.max_string_len));
    let mut registry = CommandRegistry::with_store(loader, CommandStore::new(&store_path));
    register_builtins(&mut registry, seed)?;
    tracing::debug!(store = %store_path.display(), commands = registry.len(), "registry ready");

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => repl(registry, &config)?,

        Commands::Run { name, args } => {
            let mut stdout = std::io::stdout().lock();
            if let Some(value) = Dispatcher::new(&registry).invoke(&name, &args, &mut stdout)? {
                writeln!(stdout, "{value}").map_err(|source| ShellError::Output { source })?;
            }
        }

        Commands::List => {
            for (name, entry) in registry.list() {
                let aliases = entry.aliases();
                let aliases = if aliases.is_empty() {
                    String::new()
                } else {
                    format!(" (aliases: {})", aliases.join(", "))
                };
                println!("{name}: {}{aliases}", entry.description());
            }
        }

        Commands::Define {
            name,
            source,
            description,
        } => {
            let entry = registry.define(&name, &source, description.as_deref())?;
            println!("Defined {} ({} argument(s))", entry.usage(), entry.arity());
        }

        Commands::Remove { name } => {
            if registry.remove(&name)? {
                println!("Removed {name}");
            } else {
                println!("No command named {name}");
            }
        }

        // Handled before the config is loaded.
        Commands::Config { .. } => {}
    }
    Ok(())
}

fn repl(registry: CommandRegistry, config: &ForgeConfig) -> ForgeResult<()> {
    let mut stdout = std::io::stdout();
    if std::io::stdin().is_terminal() {
        let history = ForgePaths::resolve().ok().map(|p| p.history_file());
        let reader = PromptReader::new(history)?;
        Shell::new(registry, reader, config.prompt.clone()).run(&mut stdout)?;
    } else {
        let lines = std::io::stdin()
            .lock()
            .lines()
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| ShellError::Readline {
                message: e.to_string(),
            })?;
        Shell::new(registry, LineReader::new(lines), String::new()).run(&mut stdout)?;
    }
    Ok(())
}
