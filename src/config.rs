// src/config.rs
//! Configuration file handling
//!
//! Settings come from TOML files, read in this order with later files
//! overriding earlier ones:
//!
//! - `/etc/strata/strata.toml` (system)
//! - `$XDG_CONFIG_HOME/strata.toml` (user)
//!
//! An explicit `--config PATH` replaces both. Known sections:
//!
//! ```toml
//! [core]
//! store = "/srv/strata"   # template store root
//!
//! [user]
//! name = "alice"          # default user for identifiers
//! ```
//!
//! Unknown sections and keys are kept as they are so `config set` never
//! drops anything on save.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::{Table, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const SYSTEM_CONFIG: &str = "/etc/strata/strata.toml";
const CONFIG_FILE: &str = "strata.toml";

/// Typed view of the known sections
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub core: CoreSection,

    #[serde(default)]
    pub user: UserSection,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoreSection {
    /// Root directory of the template store
    pub store: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserSection {
    /// Default user for `[user:]name` identifiers
    pub name: Option<String>,
}

/// Layered configuration; changes go to the user file
#[derive(Debug, Clone, Default)]
pub struct Config {
    path: Option<PathBuf>,
    system: Table,
    user: Table,
}

fn read_table(path: &Path) -> Result<Option<Table>> {
    match fs::read_to_string(path) {
        Ok(text) => {
            debug!("Loading configuration from {}", path.display());
            let table = text.parse::<Table>().map_err(|e| {
                Error::ConfigError(format!("{}: {}", path.display(), e))
            })?;
            Ok(Some(table))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::ConfigError(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Config {
    /// Load from `explicit`, or from the system and user files
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let system = read_table(Path::new(SYSTEM_CONFIG))?.unwrap_or_default();
        let path = dirs::config_dir().map(|dir| dir.join(CONFIG_FILE));
        let user = match &path {
            Some(path) => read_table(path)?.unwrap_or_default(),
            None => Table::new(),
        };
        Ok(Self { path, system, user })
    }

    /// Load a single file, which is also where `save` writes
    pub fn load_from(path: &Path) -> Result<Self> {
        Ok(Self {
            path: Some(path.to_path_buf()),
            system: Table::new(),
            user: read_table(path)?.unwrap_or_default(),
        })
    }

    /// File that `save` writes to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&Value> {
        [&self.user, &self.system]
            .into_iter()
            .find_map(|table| table.get(section)?.as_table()?.get(key))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.lookup(section, key).map(render)
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let entry = self
            .user
            .entry(section.to_string())
            .or_insert_with(|| Value::Table(Table::new()));
        if !entry.is_table() {
            warn!("Replacing non-table value of [{}]", section);
            *entry = Value::Table(Table::new());
        }
        if let Value::Table(table) = entry {
            table.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    /// Remove a user setting; returns whether one was removed
    pub fn unset(&mut self, section: &str, key: &str) -> bool {
        let Some(Value::Table(table)) = self.user.get_mut(section) else {
            return false;
        };
        let removed = table.remove(key).is_some();
        if table.is_empty() {
            self.user.remove(section);
        }
        removed
    }

    /// Write the user layer back to its file
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::ConfigError("no configuration directory available".to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(&self.user)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize configuration: {}", e)))?;
        fs::write(path, text)?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Every `section.key = value`, user values overriding system ones
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for table in [&self.system, &self.user] {
            for (section, values) in table {
                let Some(values) = values.as_table() else {
                    continue;
                };
                for (key, value) in values {
                    let name = format!("{}.{}", section, key);
                    entries.retain(|(n, _)| *n != name);
                    entries.push((name, render(value)));
                }
            }
        }
        entries.sort();
        entries
    }

    /// Known sections, falling back to defaults if they do not parse
    pub fn settings(&self) -> Settings {
        let mut merged = self.system.clone();
        for (section, values) in &self.user {
            match (merged.get_mut(section), values) {
                (Some(Value::Table(existing)), Value::Table(values)) => {
                    existing.extend(values.clone());
                }
                _ => {
                    merged.insert(section.clone(), values.clone());
                }
            }
        }
        Value::Table(merged).try_into().unwrap_or_else(|e| {
            warn!("Ignoring malformed configuration: {}", e);
            Settings::default()
        })
    }

    /// Default owner for identifiers without a user
    ///
    /// `[user] name`, then `$SUDO_USER`, then `$USER`.
    pub fn default_user(&self) -> Option<String> {
        self.settings()
            .user
            .name
            .or_else(|| std::env::var("SUDO_USER").ok())
            .or_else(|| std::env::var("USER").ok())
            .filter(|u| !u.is_empty())
    }

    /// Template store root, `[core] store` or the local data directory
    pub fn store_root(&self) -> PathBuf {
        self.settings().core.store.unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|dir| dir.join("strata"))
                .unwrap_or_else(|| PathBuf::from("/var/lib/strata"))
        })
    }
}
