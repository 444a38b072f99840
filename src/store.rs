//! Durable record file for custom commands.
//!
//! The store is a single JSON object mapping command names to
//! [`CommandRecord`]s. Only source text is kept; handlers are recompiled
//! through a [`ScriptLoader`] on every load.
//!
//! ```json
//! {
//!   "square": {
//!     "description": "Squares a number",
//!     "sourceText": "fn square(x) { return x * x; }",
//!     "custom": true,
//!     "aliases": ["sq"]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::script::{LoadedScript, ScriptLoader};

/// One persisted custom command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub description: String,
    pub source_text: String,
    /// Always `true` for records written by cmdforge.
    pub custom: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl CommandRecord {
    pub fn new(description: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            source_text: source_text.into(),
            custom: true,
            aliases: Vec::new(),
        }
    }
}

/// A record that decoded and recompiled successfully.
#[derive(Debug)]
pub struct StoredCommand {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub script: LoadedScript,
    pub source_text: String,
}

/// A record skipped during [`CommandStore::load_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    pub name: String,
    pub message: String,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "skipped stored command \"{}\": {}", self.name, self.message)
    }
}

/// Result of [`CommandStore::load_all`].
#[derive(Debug, Default)]
pub struct StoreLoad {
    pub entries: Vec<StoredCommand>,
    pub warnings: Vec<LoadWarning>,
}

/// JSON file holding every custom command.
#[derive(Debug, Clone)]
pub struct CommandStore {
    path: PathBuf,
}

impl CommandStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Read and recompile every stored record.
    ///
    /// A missing file is an empty store. Records that fail to decode, are not
    /// marked custom, or fail to compile are skipped and reported as
    /// warnings; the rest still load.
    pub fn load_all(&self, loader: &ScriptLoader) -> StoreResult<StoreLoad> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no command store yet");
                return Ok(StoreLoad::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&content).map_err(|e| StoreError::Parse {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;

        let mut load = StoreLoad::default();
        for (name, value) in raw {
            match decode(value, loader) {
                Ok((record, script)) => load.entries.push(StoredCommand {
                    name,
                    description: record.description,
                    aliases: record.aliases,
                    script,
                    source_text: record.source_text,
                }),
                Err(message) => {
                    tracing::warn!(
                        command = name.as_str(),
                        error = %message,
                        "failed to load stored command, skipping"
                    );
                    load.warnings.push(LoadWarning { name, message });
                }
            }
        }

        tracing::info!(
            path = %self.path.display(),
            loaded = load.entries.len(),
            skipped = load.warnings.len(),
            "loaded command store"
        );
        Ok(load)
    }

    /// Replace the store contents with `records`.
    ///
    /// The file is written to a sibling `.tmp` file, synced, then renamed
    /// over the target so a crash never leaves a half-written store.
    pub fn save_all(&self, records: &BTreeMap<String, CommandRecord>) -> StoreResult<usize> {
        let json = serde_json::to_string_pretty(records).map_err(|e| StoreError::Encode {
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let temp = self.temp_path();
        let written = fs::File::create(&temp).and_then(|mut file| {
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&temp, &self.path)) {
            let _ = fs::remove_file(&temp);
            return Err(self.io_error(e));
        }

        tracing::debug!(path = %self.path.display(), count = records.len(), "saved command store");
        Ok(records.len())
    }
}

fn decode(
    value: serde_json::Value,
    loader: &ScriptLoader,
) -> Result<(CommandRecord, LoadedScript), String> {
    let record: CommandRecord = serde_json::from_value(value).map_err(|e| e.to_string())?;
    if !record.custom {
        return Err("record is not marked custom".into());
    }
    let script = loader
        .load(&record.source_text)
        .map_err(|e| e.to_string())?;
    Ok((record, script))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CommandStore {
        CommandStore::new(dir.path().join("commands.json"))
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let load = store_in(&dir).load_all(&ScriptLoader::default()).unwrap();
        assert!(load.entries.is_empty());
        assert!(load.warnings.is_empty());
    }

    #[test]
    fn record_uses_camel_case_keys() {
        let json = serde_json::to_value(CommandRecord::new("d", "fn f() = 1")).unwrap();
        assert_eq!(json["sourceText"], "fn f() = 1");
        assert_eq!(json["custom"], true);
        assert!(json.get("aliases").is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut record = CommandRecord::new("Squares a number", "fn square(x) = x * x");
        record.aliases.push("sq".into());
        let records = BTreeMap::from([("square".to_string(), record)]);

        assert_eq!(store.save_all(&records).unwrap(), 1);
        assert!(!store.temp_path().exists());

        let load = store.load_all(&ScriptLoader::default()).unwrap();
        assert_eq!(load.entries.len(), 1);
        let entry = &load.entries[0];
        assert_eq!(entry.name, "square");
        assert_eq!(entry.description, "Squares a number");
        assert_eq!(entry.aliases, vec!["sq".to_string()]);
        assert_eq!(entry.script.arity, 1);
    }

    #[test]
    fn bad_records_are_skipped_with_warnings() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{
                "good": {"description": "ok", "sourceText": "fn good() = 1", "custom": true},
                "broken": {"description": "bad", "sourceText": "fn broken( {", "custom": true},
                "builtin": {"description": "x", "sourceText": "fn b() = 1", "custom": false},
                "garbage": 42
            }"#,
        )
        .unwrap();

        let load = store.load_all(&ScriptLoader::default()).unwrap();
        assert_eq!(load.entries.len(), 1);
        assert_eq!(load.entries[0].name, "good");
        let mut skipped: Vec<_> = load.warnings.iter().map(|w| w.name.as_str()).collect();
        skipped.sort();
        assert_eq!(skipped, ["broken", "builtin", "garbage"]);
    }

    #[test]
    fn malformed_top_level_is_a_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "[1, 2").unwrap();
        assert!(matches!(
            store.load_all(&ScriptLoader::default()),
            Err(StoreError::Parse { .. })
        ));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = CommandStore::new(dir.path().join("nested/deeper/commands.json"));
        store.save_all(&BTreeMap::new()).unwrap();
        assert_eq!(fs::read_to_string(store.path()).unwrap().trim(), "{}");
    }
}
