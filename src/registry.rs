//! Command registry: case-insensitive name/alias → entry mapping.
//!
//! Every name an entry answers to (its canonical name and each alias) maps to
//! the same `Rc<CommandEntry>`, so a lookup through an alias yields the
//! identical entry as a lookup through the canonical name. Custom entries are
//! written to the [`CommandStore`] whenever they change.
//!
//! # Collisions
//!
//! - a built-in registration replaces whatever holds its names
//! - a custom registration replaces an earlier custom entry of the same name
//! - custom names and aliases may not take a name held by a built-in
//! - claiming another entry's alias moves the alias to the new entry

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::error::{RegistryError, RegistryResult, ValidationError};
use crate::handler::{self, Handler};
use crate::script::ScriptLoader;
use crate::store::{CommandRecord, CommandStore, LoadWarning};

/// Description given to entries registered without one.
pub const DEFAULT_DESCRIPTION: &str = "No description provided";

/// Where an entry's handler came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Supplied by the host at startup. Never persisted or removed.
    Builtin,
    /// Compiled from user source; persisted.
    Custom { source: String },
}

/// A registered command.
pub struct CommandEntry {
    name: String,
    description: RefCell<String>,
    aliases: RefCell<Vec<String>>,
    handler: Box<dyn Handler>,
    origin: Origin,
}

impl CommandEntry {
    pub fn builtin(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        Self::with_origin(name.into(), Box::new(handler), Origin::Builtin)
    }

    pub fn custom(
        name: impl Into<String>,
        handler: impl Handler + 'static,
        source: impl Into<String>,
    ) -> Self {
        Self::with_origin(
            name.into(),
            Box::new(handler),
            Origin::Custom {
                source: source.into(),
            },
        )
    }

    fn with_origin(name: String, handler: Box<dyn Handler>, origin: Origin) -> Self {
        Self {
            name,
            description: RefCell::new(DEFAULT_DESCRIPTION.to_string()),
            aliases: RefCell::default(),
            handler,
            origin,
        }
    }

    /// Set the description. Blank text keeps [`DEFAULT_DESCRIPTION`].
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.set_description(description.into());
        self
    }

    pub fn with_aliases<I, S>(self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .borrow_mut()
            .extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Canonical (lowercase once registered) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> String {
        self.description.borrow().clone()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.aliases.borrow().clone()
    }

    /// Exact number of positional arguments.
    pub fn arity(&self) -> usize {
        handler::arity(self.handler.as_ref())
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.origin, Origin::Custom { .. })
    }

    pub fn source_text(&self) -> Option<&str> {
        match &self.origin {
            Origin::Custom { source } => Some(source),
            Origin::Builtin => None,
        }
    }

    /// Usage line, e.g. `add <a> <b>`.
    pub fn usage(&self) -> String {
        self.handler.signature().usage(&self.name)
    }

    fn set_description(&self, text: String) {
        let text = if text.trim().is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            text
        };
        *self.description.borrow_mut() = text;
    }

    fn record(&self) -> Option<CommandRecord> {
        let source = self.source_text()?;
        let mut record = CommandRecord::new(self.description(), source);
        record.aliases = self.aliases();
        Some(record)
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("description", &self.description.borrow())
            .field("aliases", &self.aliases.borrow())
            .field("arity", &self.arity())
            .field("origin", &self.origin)
            .finish()
    }
}

/// Lowercase `name` and check it can be typed as a command token.
fn normalize(name: &str) -> Result<String, ValidationError> {
    let lowered = name.to_lowercase();
    if lowered.is_empty() || lowered.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(lowered)
}

/// Mapping of command names and aliases to entries.
#[derive(Debug)]
pub struct CommandRegistry {
    /// Canonical name → entry.
    entries: BTreeMap<String, Rc<CommandEntry>>,
    /// Every name and alias → canonical name.
    names: HashMap<String, String>,
    loader: ScriptLoader,
    store: Option<CommandStore>,
    load_warnings: Vec<LoadWarning>,
}

impl CommandRegistry {
    /// Create an empty registry that never persists.
    pub fn new(loader: ScriptLoader) -> Self {
        Self {
            entries: BTreeMap::new(),
            names: HashMap::new(),
            loader,
            store: None,
            load_warnings: Vec::new(),
        }
    }

    /// Create a registry backed by `store`, seeded with its custom commands.
    ///
    /// Records that cannot be restored are skipped and kept as
    /// [`load_warnings`](Self::load_warnings). An unreadable store is logged
    /// and the registry starts empty.
    pub fn with_store(loader: ScriptLoader, store: CommandStore) -> Self {
        let mut registry = Self::new(loader);
        match store.load_all(&registry.loader) {
            Ok(load) => {
                registry.load_warnings = load.warnings;
                for stored in load.entries {
                    let name = stored.name.clone();
                    let entry =
                        CommandEntry::custom(stored.name, stored.script.handler, stored.source_text)
                            .with_description(stored.description)
                            .with_aliases(stored.aliases);
                    if let Err(e) = registry.insert(entry) {
                        tracing::warn!(
                            command = name.as_str(),
                            error = %e,
                            "failed to restore stored command, skipping"
                        );
                        registry.load_warnings.push(LoadWarning {
                            name,
                            message: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %store.path().display(),
                    error = %e,
                    "command store unreadable, starting empty"
                );
            }
        }
        registry.store = Some(store);
        registry
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    pub fn store(&self) -> Option<&CommandStore> {
        self.store.as_ref()
    }

    /// Records skipped while loading the store.
    pub fn load_warnings(&self) -> &[LoadWarning] {
        &self.load_warnings
    }

    /// Number of distinct entries (aliases not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `entry`, resolving collisions, and persist it if it is custom.
    ///
    /// When the save fails the entry stays registered and
    /// [`RegistryError::Store`] is returned.
    pub fn register(&mut self, entry: CommandEntry) -> RegistryResult<Rc<CommandEntry>> {
        let entry = self.insert(entry)?;
        tracing::info!(
            command = entry.name(),
            arity = entry.arity(),
            custom = entry.is_custom(),
            "registered command"
        );
        if entry.is_custom() {
            self.save()?;
        }
        Ok(entry)
    }

    /// Compile `source` and register it as the custom command `name`.
    ///
    /// Compile and validation failures leave the registry untouched.
    pub fn define(
        &mut self,
        name: &str,
        source: &str,
        description: Option<&str>,
    ) -> RegistryResult<Rc<CommandEntry>> {
        let loaded = self.loader.load(source)?;
        let mut entry = CommandEntry::custom(name, loaded.handler, source);
        if let Some(description) = description {
            entry = entry.with_description(description);
        }
        self.register(entry)
    }

    /// Look up an entry by name or alias, case-insensitively.
    pub fn resolve(&self, name: &str) -> Option<Rc<CommandEntry>> {
        let canonical = self.names.get(&name.to_lowercase())?;
        self.entries.get(canonical).cloned()
    }

    /// One row per entry, ordered by canonical name.
    pub fn list(&self) -> Vec<(String, Rc<CommandEntry>)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.clone(), Rc::clone(entry)))
            .collect()
    }

    /// Usage, description and aliases of `name`, or `None` if unknown.
    pub fn describe(&self, name: &str) -> Option<String> {
        let entry = self.resolve(name)?;
        let mut text = format!("{}\n  {}", entry.usage(), entry.description());
        let aliases = entry.aliases();
        if !aliases.is_empty() {
            text.push_str(&format!("\n  aliases: {}", aliases.join(", ")));
        }
        Some(text)
    }

    /// Make `alias` another name for the entry `target` resolves to.
    pub fn alias(&mut self, alias: &str, target: &str) -> RegistryResult<Rc<CommandEntry>> {
        let alias = normalize(alias)?;
        let entry = self.resolve(target).ok_or_else(|| RegistryError::NotFound {
            name: target.to_string(),
        })?;

        let mut took_from_custom = false;
        if let Some(canonical) = self.names.get(&alias).cloned() {
            if canonical == entry.name() {
                return Ok(entry);
            }
            if let Some(holder) = self.entries.get(&canonical) {
                if !holder.is_custom() {
                    return Err(ValidationError::ReservedName { name: alias }.into());
                }
                if canonical == alias {
                    return Err(ValidationError::NameInUse {
                        name: alias,
                        command: canonical,
                    }
                    .into());
                }
                took_from_custom = true;
            }
            self.unbind_alias(&alias, &canonical);
        }

        self.names.insert(alias.clone(), entry.name().to_string());
        entry.aliases.borrow_mut().push(alias.clone());
        tracing::info!(alias = alias.as_str(), command = entry.name(), "added alias");

        if entry.is_custom() || took_from_custom {
            self.save()?;
        }
        Ok(entry)
    }

    /// Replace the description of the entry `name` resolves to.
    pub fn set_description(&mut self, name: &str, text: &str) -> RegistryResult<Rc<CommandEntry>> {
        let entry = self.resolve(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
        })?;
        entry.set_description(text.to_string());
        if entry.is_custom() {
            self.save()?;
        }
        Ok(entry)
    }

    /// Remove the custom entry `name` resolves to, with all its aliases.
    ///
    /// Returns `false` when nothing was registered under `name`.
    pub fn remove(&mut self, name: &str) -> RegistryResult<bool> {
        let Some(entry) = self.resolve(name) else {
            return Ok(false);
        };
        if !entry.is_custom() {
            return Err(ValidationError::ReservedName {
                name: name.to_lowercase(),
            }
            .into());
        }
        self.evict(entry.name());
        tracing::info!(command = entry.name(), "removed command");
        self.save()?;
        Ok(true)
    }

    /// Persist every custom entry. A registry without a store does nothing.
    pub fn save(&self) -> RegistryResult<()> {
        if let Some(store) = &self.store {
            store.save_all(&self.records())?;
        }
        Ok(())
    }

    /// Store records for every custom entry.
    pub fn records(&self) -> BTreeMap<String, CommandRecord> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| entry.record().map(|r| (name.clone(), r)))
            .collect()
    }

    /// Bind `entry` under its names without saving.
    fn insert(&mut self, mut entry: CommandEntry) -> RegistryResult<Rc<CommandEntry>> {
        let name = normalize(&entry.name)?;
        let mut aliases: Vec<String> = Vec::new();
        for alias in entry.aliases.take() {
            let alias = normalize(&alias)?;
            if alias != name && !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }

        // Check every claimed name before changing anything.
        if entry.is_custom() {
            for claimed in std::iter::once(&name).chain(&aliases) {
                let Some(holder) = self.resolve(claimed) else {
                    continue;
                };
                if !holder.is_custom() {
                    return Err(ValidationError::ReservedName {
                        name: claimed.clone(),
                    }
                    .into());
                }
                if claimed != &name && holder.name() == claimed {
                    return Err(ValidationError::NameInUse {
                        name: claimed.clone(),
                        command: holder.name().to_string(),
                    }
                    .into());
                }
            }
        }

        for claimed in std::iter::once(&name).chain(&aliases) {
            match self.names.get(claimed).cloned() {
                Some(canonical) if &canonical == claimed => self.evict(&canonical),
                Some(canonical) => self.unbind_alias(claimed, &canonical),
                None => {}
            }
        }

        entry.name = name.clone();
        *entry.aliases.get_mut() = aliases.clone();
        let entry = Rc::new(entry);

        self.names.insert(name.clone(), name.clone());
        for alias in aliases {
            self.names.insert(alias, name.clone());
        }
        self.entries.insert(name, Rc::clone(&entry));
        Ok(entry)
    }

    fn evict(&mut self, canonical: &str) {
        if let Some(old) = self.entries.remove(canonical) {
            self.names.remove(canonical);
            for alias in old.aliases.borrow().iter() {
                self.names.remove(alias);
            }
            tracing::debug!(command = canonical, "replaced command");
        }
    }

    fn unbind_alias(&mut self, alias: &str, canonical: &str) {
        self.names.remove(alias);
        if let Some(holder) = self.entries.get(canonical) {
            holder.aliases.borrow_mut().retain(|a| a != alias);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NativeHandler;
    use crate::script::Value;

    fn native(name: &str, params: &[&str]) -> NativeHandler {
        NativeHandler::new(name, params, |_, _| Ok(Value::Nil))
    }

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new(ScriptLoader::default());
        registry
            .register(
                CommandEntry::builtin("greet", native("greet", &["name"]))
                    .with_description("Greets the user by name.")
                    .with_aliases(["hello"]),
            )
            .unwrap();
        registry
    }

    #[test]
    fn alias_resolves_to_the_same_entry() {
        let registry = registry();
        let by_name = registry.resolve("greet").unwrap();
        let by_alias = registry.resolve("HELLO").unwrap();
        assert!(Rc::ptr_eq(&by_name, &by_alias));
        assert_eq!(by_alias.arity(), 1);
    }

    #[test]
    fn names_are_lowercased() {
        let mut registry = registry();
        let entry = registry.define("Square", "fn sq(x) = x * x", None).unwrap();
        assert_eq!(entry.name(), "square");
        assert!(registry.resolve("SQUARE").is_some());
        assert_eq!(entry.description(), DEFAULT_DESCRIPTION);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut registry = registry();
        for bad in ["", "two words", "tab\tname"] {
            let err = registry.define(bad, "fn f() = 1", None).unwrap_err();
            assert!(matches!(
                err,
                RegistryError::Validation(ValidationError::InvalidName { .. })
            ));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn custom_commands_cannot_take_builtin_names() {
        let mut registry = registry();
        for taken in ["greet", "Hello"] {
            let err = registry.define(taken, "fn f() = 1", None).unwrap_err();
            assert!(matches!(
                err,
                RegistryError::Validation(ValidationError::ReservedName { .. })
            ));
        }
        assert!(!registry.resolve("greet").unwrap().is_custom());
    }

    #[test]
    fn builtins_replace_custom_commands() {
        let mut registry = CommandRegistry::new(ScriptLoader::default());
        registry.define("greet", "fn g() = 1", None).unwrap();
        registry
            .register(CommandEntry::builtin("greet", native("greet", &["name"])))
            .unwrap();
        let entry = registry.resolve("greet").unwrap();
        assert!(!entry.is_custom());
        assert!(registry.records().is_empty());
    }

    #[test]
    fn redefining_replaces_the_entry_and_its_aliases() {
        let mut registry = registry();
        registry.define("square", "fn s(x) = x * x", None).unwrap();
        registry.alias("sq", "square").unwrap();

        let entry = registry.define("square", "fn s(a, b) = a * b", None).unwrap();
        assert_eq!(entry.arity(), 2);
        assert!(entry.aliases().is_empty());
        assert!(registry.resolve("sq").is_none());
    }

    #[test]
    fn claiming_an_alias_moves_it() {
        let mut registry = registry();
        registry.define("first", "fn f() = 1", None).unwrap();
        registry.define("second", "fn f() = 2", None).unwrap();
        registry.alias("x", "first").unwrap();
        registry.alias("x", "second").unwrap();

        assert_eq!(registry.resolve("x").unwrap().name(), "second");
        assert!(registry.resolve("first").unwrap().aliases().is_empty());

        // A new command named like an alias takes the name over.
        registry.define("x", "fn f() = 3", None).unwrap();
        assert!(registry.resolve("second").unwrap().aliases().is_empty());
        assert_eq!(registry.resolve("x").unwrap().name(), "x");
    }

    #[test]
    fn alias_cannot_shadow_another_command() {
        let mut registry = registry();
        registry.define("first", "fn f() = 1", None).unwrap();
        registry.define("second", "fn f() = 2", None).unwrap();
        assert!(matches!(
            registry.alias("first", "second").unwrap_err(),
            RegistryError::Validation(ValidationError::NameInUse { .. })
        ));
        assert!(matches!(
            registry.alias("hello", "first").unwrap_err(),
            RegistryError::Validation(ValidationError::ReservedName { .. })
        ));
        assert!(matches!(
            registry.alias("y", "missing").unwrap_err(),
            RegistryError::NotFound { .. }
        ));
    }

    #[test]
    fn list_has_one_row_per_entry() {
        let mut registry = registry();
        registry.define("square", "fn s(x) = x * x", None).unwrap();
        registry.alias("sq", "square").unwrap();
        let names: Vec<_> = registry.list().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["greet", "square"]);
    }

    #[test]
    fn describe_shows_usage_description_and_aliases() {
        let registry = registry();
        let text = registry.describe("hello").unwrap();
        assert!(text.starts_with("greet <name>"), "{text}");
        assert!(text.contains("Greets the user by name."));
        assert!(text.contains("aliases: hello"));
        assert!(registry.describe("nope").is_none());
    }

    #[test]
    fn description_changes_are_visible_through_aliases() {
        let mut registry = registry();
        registry.set_description("hello", "Says hi").unwrap();
        assert_eq!(registry.resolve("greet").unwrap().description(), "Says hi");
    }

    #[test]
    fn remove_is_idempotent_and_spares_builtins() {
        let mut registry = registry();
        registry.define("square", "fn s(x) = x * x", None).unwrap();
        registry.alias("sq", "square").unwrap();

        assert!(registry.remove("sq").unwrap());
        assert!(registry.resolve("square").is_none());
        assert!(registry.resolve("sq").is_none());
        assert!(!registry.remove("square").unwrap());
        assert!(matches!(
            registry.remove("greet").unwrap_err(),
            RegistryError::Validation(ValidationError::ReservedName { .. })
        ));
    }

    #[test]
    fn failed_define_leaves_registry_unchanged() {
        let mut registry = registry();
        let err = registry
            .define("two", "fn a() = 1\nfn b() = 2", None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Compile(_)));
        let err = registry
            .define("six", "fn six(a, b, c, d, e, f) = a", None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("two").is_none());
    }

    #[test]
    fn only_custom_entries_become_records() {
        let mut registry = registry();
        registry
            .define("square", "fn s(x) = x * x", Some("Squares"))
            .unwrap();
        registry.alias("sq", "square").unwrap();
        let records = registry.records();
        assert_eq!(records.len(), 1);
        let record = &records["square"];
        assert_eq!(record.description, "Squares");
        assert_eq!(record.source_text, "fn s(x) = x * x");
        assert_eq!(record.aliases, vec!["sq".to_string()]);
    }
}
