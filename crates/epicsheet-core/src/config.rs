use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::quarter::DEFAULT_PARTITION_PREFIX;

/// Where the workbook lives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Google Sheets over REST.
    #[default]
    Google,
    /// Local SQLite workbook file.
    Sqlite(PathBuf),
    /// Ephemeral in-process workbook.
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Google => f.write_str("google"),
            Self::Sqlite(path) => write!(f, "sqlite:{}", path.display()),
            Self::Memory => f.write_str("memory"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "google" => Ok(Self::Google),
            "memory" => Ok(Self::Memory),
            _ => match s.strip_prefix("sqlite:") {
                Some(path) if !path.trim().is_empty() => Ok(Self::Sqlite(PathBuf::from(path.trim()))),
                _ => Err(format!(
                    "unknown backend '{s}': expected google, memory or sqlite:<path>"
                )),
            },
        }
    }
}

impl Serialize for BackendKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BackendKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Sheet names of the workbook tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetNames {
    pub epics: String,
    pub epic_status: String,
    /// Unpartitioned status-update log that predates quarterly partitions.
    pub legacy_updates: String,
    pub metadata: String,
    /// Prefix of quarterly partitions; the quarter label is appended.
    pub partition_prefix: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            epics: "Epics".to_string(),
            epic_status: "Epic_Status".to_string(),
            legacy_updates: "Status_Updates".to_string(),
            metadata: "Metadata".to_string(),
            partition_prefix: DEFAULT_PARTITION_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Maximum rows per append request when moving events.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between append batches, in milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

impl MigrationConfig {
    #[must_use]
    pub const fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

/// Effective store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    /// Write credential. Only ever read from the environment.
    #[serde(skip)]
    pub access_token: Option<String>,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default)]
    pub sheets: SheetNames,
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            spreadsheet_id: None,
            access_token: None,
            cache_ttl_ms: default_cache_ttl_ms(),
            sheets: SheetNames::default(),
            migration: MigrationConfig::default(),
        }
    }
}

const fn default_cache_ttl_ms() -> u64 {
    60_000
}

const fn default_batch_size() -> usize {
    1000
}

const fn default_batch_pause_ms() -> u64 {
    100
}

impl StoreConfig {
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Apply environment overrides read through `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if `CACHE_DURATION` is not an integer or
    /// `EPICSHEET_BACKEND` names an unknown backend.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = get("SPREADSHEET_ID") {
            self.spreadsheet_id = Some(id.trim().to_string());
        }
        if let Some(token) = get("GOOGLE_SHEETS_ACCESS_TOKEN") {
            self.access_token = Some(token.trim().to_string());
        }
        if let Some(ttl) = get("CACHE_DURATION") {
            self.cache_ttl_ms = ttl
                .trim()
                .parse()
                .with_context(|| format!("CACHE_DURATION must be milliseconds, got '{ttl}'"))?;
        }
        if let Some(backend) = get("EPICSHEET_BACKEND") {
            self.backend = match backend.parse() {
                Ok(kind) => kind,
                Err(msg) => bail!("EPICSHEET_BACKEND: {msg}"),
            };
        }
        Ok(())
    }
}

/// Default config file location: `<config_dir>/epicsheet/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("epicsheet").join("config.toml"))
}

/// Parse a TOML config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> Result<StoreConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str::<StoreConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve configuration: defaults, then the config file, then environment.
///
/// An explicit `path` must exist; the default location is optional.
///
/// # Errors
///
/// Returns an error if a config file is unreadable or malformed, or an
/// environment override is invalid.
pub fn load(path: Option<&Path>) -> Result<StoreConfig> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => load_file(&path)?,
            None => StoreConfig::default(),
        },
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_workbook_layout() {
        let config = StoreConfig::default();
        assert_eq!(config.backend, BackendKind::Google);
        assert_eq!(config.sheets.epics, "Epics");
        assert_eq!(config.sheets.epic_status, "Epic_Status");
        assert_eq!(config.sheets.legacy_updates, "Status_Updates");
        assert_eq!(config.sheets.metadata, "Metadata");
        assert_eq!(config.sheets.partition_prefix, "Status_Updates_");
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.migration.batch_pause(), Duration::from_millis(100));
    }

    #[test]
    fn file_values_fill_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "backend = \"sqlite:/tmp/book.sqlite3\"\ncache_ttl_ms = 5\n[sheets]\nepics = \"Work\"\n",
        )
        .expect("write config");

        let config = load_file(&path).expect("parse");
        assert_eq!(config.backend, BackendKind::Sqlite(PathBuf::from("/tmp/book.sqlite3")));
        assert_eq!(config.cache_ttl_ms, 5);
        assert_eq!(config.sheets.epics, "Work");
        assert_eq!(config.sheets.metadata, "Metadata");
        assert_eq!(config.migration.batch_size, 1000);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut config = StoreConfig::default();
        config
            .apply_env(env_of(&[
                ("SPREADSHEET_ID", " abc123 "),
                ("GOOGLE_SHEETS_ACCESS_TOKEN", "ya29.token"),
                ("CACHE_DURATION", "1500"),
                ("EPICSHEET_BACKEND", "memory"),
            ]))
            .expect("apply env");
        assert_eq!(config.spreadsheet_id.as_deref(), Some("abc123"));
        assert_eq!(config.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.cache_ttl_ms, 1500);
        assert_eq!(config.backend, BackendKind::Memory);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = StoreConfig::default();
        config
            .apply_env(env_of(&[("GOOGLE_SHEETS_ACCESS_TOKEN", "  ")]))
            .expect("apply env");
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut config = StoreConfig::default();
        assert!(config.apply_env(env_of(&[("CACHE_DURATION", "soon")])).is_err());
        assert!(config.apply_env(env_of(&[("EPICSHEET_BACKEND", "excel")])).is_err());
        assert!("sqlite:".parse::<BackendKind>().is_err());
    }

    #[test]
    fn token_is_never_serialized() {
        let config = StoreConfig {
            access_token: Some("secret".into()),
            ..StoreConfig::default()
        };
        let rendered = toml::to_string(&config).expect("serialize");
        assert!(!rendered.contains("secret"));
    }
}
