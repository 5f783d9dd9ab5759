//! Configuration management.
//!
//! Settings come from three layers, later ones winning:
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, `SPENDLOG_CONFIG_PATH`, or the platform
//!    config directory)
//! 3. `SPENDLOG_*` environment variables (a `.env` file is loaded first)
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `SPENDLOG_STORAGE_BACKEND` | `storage.backend` |
//! | `SPENDLOG_SQLITE_PATH` | `storage.sqlite_path` |
//! | `SPENDLOG_POSTGRES_URL` | `storage.postgres_url` |
//! | `SPENDLOG_TIMEOUT_MS` | `storage.timeout_ms` |
//! | `SPENDLOG_LOG_FORMAT` | `logging.format` |

use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "SPENDLOG_CONFIG_PATH";

/// Default per-operation storage timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackendType {
    /// Process-local rows, lost on exit.
    Memory,
    /// Embedded `SQLite` database.
    #[default]
    Sqlite,
    /// Managed PostgreSQL store.
    Postgres,
}

impl StorageBackendType {
    /// Returns the backend as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }
}

impl FromStr for StorageBackendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(Error::InvalidInput(format!(
                "unknown storage backend '{other}' (expected memory, sqlite or postgres)"
            ))),
        }
    }
}

impl fmt::Display for StorageBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved storage settings.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Which backend to construct.
    pub backend: StorageBackendType,
    /// `SQLite` database file; `None` keeps the database in memory.
    pub sqlite_path: Option<PathBuf>,
    /// PostgreSQL connection URL.
    pub postgres_url: Option<SecretString>,
    /// Maximum pooled PostgreSQL connections.
    pub pool_max_size: Option<usize>,
    /// Per-operation timeout.
    pub timeout: Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::default(),
            sqlite_path: None,
            postgres_url: None,
            pool_max_size: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Logging settings as written in the config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Level or filter directive (`info`, `spendlog=debug`).
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Main configuration for spendlog.
#[derive(Debug, Clone, Default)]
pub struct SpendlogConfig {
    /// Storage settings.
    pub storage: StorageSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileStorage {
    /// Backend name.
    pub backend: Option<String>,
    /// `SQLite` database path.
    pub sqlite_path: Option<String>,
    /// PostgreSQL URL.
    pub postgres_url: Option<String>,
    /// Maximum pool size.
    pub pool_max_size: Option<usize>,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl SpendlogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the file cannot be read or
    /// parsed, and [`Error::InvalidInput`] for an unknown backend name.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] for malformed TOML and
    /// [`Error::InvalidInput`] for an unknown backend name.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// `SPENDLOG_CONFIG_PATH` wins if set; otherwise
    /// `<config_dir>/spendlog/config.toml` is used when present. Without a
    /// file, the `SQLite` database lives in `<data_dir>/spendlog/spendlog.db`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_default() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from_file(Path::new(&path));
        }

        let Some(dirs) = directories::ProjectDirs::from("", "", "spendlog") else {
            return Ok(Self::default());
        };

        let path = dirs.config_dir().join("config.toml");
        let mut config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };

        if config.storage.sqlite_path.is_none() {
            config.storage.sqlite_path = Some(dirs.data_dir().join("spendlog.db"));
        }
        Ok(config)
    }

    /// Converts a [`ConfigFile`] to [`SpendlogConfig`].
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(storage) = file.storage {
            if let Some(backend) = storage.backend {
                config.storage.backend = backend.parse()?;
            }
            config.storage.sqlite_path = storage.sqlite_path.map(PathBuf::from);
            config.storage.postgres_url = storage.postgres_url.map(SecretString::from);
            config.storage.pool_max_size = storage.pool_max_size;
            if let Some(ms) = storage.timeout_ms {
                config.storage.timeout = Duration::from_millis(ms);
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }

        Ok(config)
    }

    /// Applies `SPENDLOG_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown backend name or a
    /// non-numeric timeout.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown backend name or a
    /// non-numeric timeout.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(backend) = lookup("SPENDLOG_STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(path) = lookup("SPENDLOG_SQLITE_PATH") {
            self.storage.sqlite_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup("SPENDLOG_POSTGRES_URL") {
            self.storage.postgres_url = Some(SecretString::from(url));
        }
        if let Some(ms) = lookup("SPENDLOG_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                Error::InvalidInput(format!("SPENDLOG_TIMEOUT_MS must be milliseconds, got '{ms}'"))
            })?;
            self.storage.timeout = Duration::from_millis(ms);
        }
        if let Some(format) = lookup("SPENDLOG_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        Ok(self)
    }

    /// Sets the storage backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: StorageBackendType) -> Self {
        self.storage.backend = backend;
        self
    }
}

/// Loads `.env` from the working directory, if present.
///
/// Existing environment variables are never overwritten.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {},
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    #[test_case("memory", StorageBackendType::Memory)]
    #[test_case("SQLite", StorageBackendType::Sqlite)]
    #[test_case("postgresql", StorageBackendType::Postgres)]
    #[test_case(" pg ", StorageBackendType::Postgres)]
    fn test_backend_parse(input: &str, expected: StorageBackendType) {
        assert_eq!(input.parse::<StorageBackendType>().unwrap(), expected);
    }

    #[test]
    fn test_backend_parse_unknown() {
        assert!(matches!(
            "ydb".parse::<StorageBackendType>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = SpendlogConfig::new();
        assert_eq!(config.storage.backend, StorageBackendType::Sqlite);
        assert_eq!(config.storage.timeout, Duration::from_secs(5));
        assert!(config.storage.postgres_url.is_none());
        assert_eq!(config.logging, LoggingSettings::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
backend = "postgres"
postgres_url = "postgresql://bot:secret@db/spendlog"
pool_max_size = 4
timeout_ms = 1500

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = SpendlogConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.storage.backend, StorageBackendType::Postgres);
        assert_eq!(
            config.storage.postgres_url.as_ref().map(|u| u.expose_secret()),
            Some("postgresql://bot:secret@db/spendlog")
        );
        assert_eq!(config.storage.pool_max_size, Some(4));
        assert_eq!(config.storage.timeout, Duration::from_millis(1500));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_secret_is_not_debug_printed() {
        let config = SpendlogConfig::from_toml(
            "[storage]\npostgres_url = \"postgresql://bot:hunter2@db/x\"\n",
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            SpendlogConfig::from_toml("[storage\nbackend = 1"),
            Err(Error::OperationFailed { .. })
        ));
        assert!(matches!(
            SpendlogConfig::from_toml("[storage]\nbackend = \"ydb\""),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            SpendlogConfig::from_toml("[storage]\nhost = \"x\""),
            Err(Error::OperationFailed { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = SpendlogConfig::load_from_file(Path::new("/nonexistent/spendlog.toml"))
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { ref operation, .. } if operation == "read_config_file"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SPENDLOG_STORAGE_BACKEND", "memory"),
            ("SPENDLOG_SQLITE_PATH", "/tmp/x.db"),
            ("SPENDLOG_TIMEOUT_MS", "250"),
            ("SPENDLOG_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let config = SpendlogConfig::new()
            .apply_overrides(|k| env.get(k).map(ToString::to_string))
            .unwrap();
        assert_eq!(config.storage.backend, StorageBackendType::Memory);
        assert_eq!(config.storage.sqlite_path, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(config.storage.timeout, Duration::from_millis(250));
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_env_override_rejects_bad_timeout() {
        let result = SpendlogConfig::new().apply_overrides(|k| {
            (k == "SPENDLOG_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
