//! XDG-compliant path resolution for cmdforge.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(cmdforge::paths::no_home),
        help(
            "Set the HOME environment variable, or pass --config and --store explicitly."
        )
    )]
    NoHome,
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG directories for cmdforge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgePaths {
    /// `$XDG_CONFIG_HOME/cmdforge/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/cmdforge/`
    pub data_dir: PathBuf,
    /// `$XDG_STATE_HOME/cmdforge/`, home of the shell history.
    pub state_dir: PathBuf,
}

impl ForgePaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("cmdforge");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("cmdforge");

        let state_dir = std::env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/state"))
            .join("cmdforge");

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
        })
    }

    /// Path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default location of the command store.
    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join("commands.json")
    }

    /// Line-editor history for the REPL.
    pub fn history_file(&self) -> PathBuf {
        self.state_dir.join("history.txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_use_cmdforge_dirs() {
        // Reads the real environment; mutating it is unsafe in edition 2024.
        if std::env::var("HOME").is_err() {
            return;
        }
        let paths = ForgePaths::resolve().unwrap();
        assert!(paths.config_dir.ends_with("cmdforge"));
        assert!(paths.data_dir.ends_with("cmdforge"));
    }

    #[test]
    fn files_derive_from_dirs() {
        let paths = ForgePaths {
            config_dir: PathBuf::from("/cfg/cmdforge"),
            data_dir: PathBuf::from("/data/cmdforge"),
            state_dir: PathBuf::from("/state/cmdforge"),
        };
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/cmdforge/config.toml"));
        assert_eq!(paths.store_file(), PathBuf::from("/data/cmdforge/commands.json"));
        assert_eq!(paths.history_file(), PathBuf::from("/state/cmdforge/history.txt"));
    }
}
