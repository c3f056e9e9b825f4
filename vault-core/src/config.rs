//! Configuration management
//!
//! Settings live in `settings.json` inside the vault directory:
//! ```json
//! {
//!   "database": { "file": "vault.duckdb", "inMemory": false },
//!   "eventLog": { "enabled": true }
//! }
//! ```
//! Keys this crate does not manage are kept as-is when saving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

pub const SETTINGS_FILENAME: &str = "settings.json";
pub const DEFAULT_DATABASE_FILE: &str = "vault.duckdb";

pub const ENV_DATABASE_FILE: &str = "VAULT_DATABASE_FILE";
pub const ENV_IN_MEMORY: &str = "VAULT_IN_MEMORY";
pub const ENV_EVENT_LOG: &str = "VAULT_EVENT_LOG";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default)]
    event_log: EventLogSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    #[serde(default)]
    in_memory: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventLogSettings {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for EventLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            other: HashMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Vault configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file name, relative to the vault directory unless absolute
    pub database_file: String,
    pub in_memory: bool,
    pub event_log_enabled: bool,
    // Keep the raw settings for preservation when saving
    _raw_settings: SettingsFile,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_settings(SettingsFile::default())
    }
}

impl Config {
    /// Load config from the vault directory
    ///
    /// Every setting can be overridden through the environment
    /// (`VAULT_DATABASE_FILE`, `VAULT_IN_MEMORY`, `VAULT_EVENT_LOG`).
    pub fn load(vault_dir: &Path) -> Result<Self> {
        let mut config = Self::from_settings(read_settings(vault_dir)?);
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_settings(raw: SettingsFile) -> Self {
        Self {
            database_file: raw
                .database
                .file
                .clone()
                .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string()),
            in_memory: raw.database.in_memory,
            event_log_enabled: raw.event_log.enabled,
            _raw_settings: raw,
        }
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(file) = lookup(ENV_DATABASE_FILE).filter(|f| !f.trim().is_empty()) {
            self.database_file = file;
        }
        if let Some(value) = lookup(ENV_IN_MEMORY) {
            self.in_memory = parse_flag(ENV_IN_MEMORY, &value)?;
        }
        if let Some(value) = lookup(ENV_EVENT_LOG) {
            self.event_log_enabled = parse_flag(ENV_EVENT_LOG, &value)?;
        }
        Ok(())
    }

    /// Absolute location of the ledger database for this vault
    pub fn database_path(&self, vault_dir: &Path) -> PathBuf {
        let file = Path::new(&self.database_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            vault_dir.join(file)
        }
    }

    /// Save config to the vault directory
    /// Preserves other settings this crate doesn't manage
    pub fn save(&self, vault_dir: &Path) -> Result<()> {
        let settings_path = vault_dir.join(SETTINGS_FILENAME);

        // Re-read so edits made since load are not lost
        let mut settings = read_settings(vault_dir)?;

        settings.database.file = Some(self.database_file.clone());
        settings.database.in_memory = self.in_memory;
        settings.event_log.enabled = self.event_log_enabled;

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

fn read_settings(vault_dir: &Path) -> Result<SettingsFile> {
    let settings_path = vault_dir.join(SETTINGS_FILENAME);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)?;
    serde_json::from_str(&content).map_err(|e| {
        Error::config(format!("malformed {}: {}", settings_path.display(), e))
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "true" | "1" | "yes" | "TRUE" | "YES" => Ok(true),
        "false" | "0" | "no" | "FALSE" | "NO" => Ok(false),
        other => Err(Error::config(format!("{} must be a boolean, got '{}'", key, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::from_settings(read_settings(dir.path()).unwrap());
        config.apply_overrides(no_env).unwrap();

        assert_eq!(config.database_file, DEFAULT_DATABASE_FILE);
        assert!(!config.in_memory);
        assert!(config.event_log_enabled);
        assert_eq!(config.database_path(dir.path()), dir.path().join("vault.duckdb"));
    }

    #[test]
    fn test_reads_camel_case_settings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILENAME),
            r#"{"database": {"file": "trades.duckdb", "inMemory": true}, "eventLog": {"enabled": false}}"#,
        )
        .unwrap();

        let config = Config::from_settings(read_settings(dir.path()).unwrap());
        assert_eq!(config.database_file, "trades.duckdb");
        assert!(config.in_memory);
        assert!(!config.event_log_enabled);
    }

    #[test]
    fn test_malformed_settings_is_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILENAME), "{ not json").unwrap();

        let err = read_settings(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                ENV_DATABASE_FILE => Some("/tmp/other.duckdb".to_string()),
                ENV_IN_MEMORY => Some("1".to_string()),
                ENV_EVENT_LOG => Some("no".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.database_file, "/tmp/other.duckdb");
        assert!(config.in_memory);
        assert!(!config.event_log_enabled);

        let err = config
            .apply_overrides(|key| (key == ENV_IN_MEMORY).then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_preserves_unmanaged_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILENAME),
            r#"{"theme": "dark", "database": {"file": "vault.duckdb", "pageSize": 4096}}"#,
        )
        .unwrap();

        let mut config = Config::from_settings(read_settings(dir.path()).unwrap());
        config.event_log_enabled = false;
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(SETTINGS_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["database"]["pageSize"], 4096);
        assert_eq!(saved["eventLog"]["enabled"], false);
    }
}
