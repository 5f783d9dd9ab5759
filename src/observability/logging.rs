//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Environment variable holding a filter directive; checked before `RUST_LOG`.
pub const LOG_ENV: &str = "SPENDLOG_LOG";

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Event format.
    pub format: LogFormat,
    /// `tracing_subscriber::EnvFilter` directive.
    pub filter: String,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Resolves logging from file settings, the environment and `--verbose`.
    ///
    /// Filter precedence: `SPENDLOG_LOG`, `RUST_LOG`, `logging.level`, then
    /// `debug` with `--verbose` or `warn` without.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Same as [`from_settings`](Self::from_settings) with an explicit
    /// environment lookup.
    #[must_use]
    pub fn resolve(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let filter = lookup(LOG_ENV)
            .or_else(|| lookup("RUST_LOG"))
            .filter(|s| !s.trim().is_empty())
            .or_else(|| settings.and_then(|s| s.level.clone()))
            .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string());

        Self {
            format: settings
                .and_then(|s| s.format.as_deref())
                .map(LogFormat::parse)
                .unwrap_or_default(),
            filter,
            file: settings.and_then(|s| s.file.clone()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "warn".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Pretty);
    }

    #[test]
    fn test_defaults() {
        assert_eq!(LoggingConfig::resolve(None, false, no_env), LoggingConfig::default());
        assert_eq!(LoggingConfig::resolve(None, true, no_env).filter, "debug");
    }

    #[test]
    fn test_settings() {
        let settings = LoggingSettings {
            level: Some("spendlog=trace".to_string()),
            format: Some("json".to_string()),
            file: Some(PathBuf::from("/var/log/spendlog.log")),
        };
        let config = LoggingConfig::resolve(Some(&settings), true, no_env);
        assert_eq!(config.filter, "spendlog=trace");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/var/log/spendlog.log")));
    }

    #[test]
    fn test_env_wins() {
        let settings = LoggingSettings {
            level: Some("info".to_string()),
            ..LoggingSettings::default()
        };
        let config = LoggingConfig::resolve(Some(&settings), false, |key| match key {
            "SPENDLOG_LOG" => Some("error".to_string()),
            "RUST_LOG" => Some("trace".to_string()),
            _ => None,
        });
        assert_eq!(config.filter, "error");

        let config = LoggingConfig::resolve(Some(&settings), false, |key| {
            (key == "RUST_LOG").then(|| "trace".to_string())
        });
        assert_eq!(config.filter, "trace");
    }
}
