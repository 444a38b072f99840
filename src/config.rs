//! User configuration, persisted as TOML in `$XDG_CONFIG_HOME/cmdforge/config.toml`.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::script::{DEFAULT_MAX_STEPS, DEFAULT_MAX_STRING_LEN};

/// Errors from reading or writing the config file.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(cmdforge::config::read),
        help("Ensure the config file is readable, or remove it to use the defaults.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(
        code(cmdforge::config::parse),
        help("Check the TOML syntax. Known keys: store_path, max_steps, max_string_len, seed, prompt, log_filter.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(cmdforge::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings for the shell and its command store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Command store location. Defaults to `$XDG_DATA_HOME/cmdforge/commands.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Interpreter step budget per command invocation.
    pub max_steps: u64,
    /// Largest string, in bytes, a command handler may build.
    pub max_string_len: usize,
    /// Fixed seed for `random()` and `roll`; entropy when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub prompt: String,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            max_steps: DEFAULT_MAX_STEPS,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            seed: None,
            prompt: "cmdforge> ".into(),
            log_filter: "warn".into(),
        }
    }
}

impl ForgeConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load from `path` if it exists, otherwise use the defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the defaults to `path` unless a file is already there, or
    /// `force` is set. Returns whether the file was written.
    pub fn init(path: &Path, force: bool) -> ConfigResult<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        Self::default().save(path)?;
        tracing::info!(path = %path.display(), "wrote default config");
        Ok(true)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
