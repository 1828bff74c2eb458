//! Server configuration from the environment

use std::path::PathBuf;

const DEFAULT_PORT: u16 = 8000;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// A variable that was set but could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub var: &'static str,
    pub value: String,
    pub fallback: String,
}

impl ConfigWarning {
    pub fn log(&self) {
        tracing::warn!(
            var = self.var,
            value = %self.value,
            fallback = %self.fallback,
            "Invalid configuration value, using default"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    pub log_format: LogFormat,
    /// Fallbacks taken while reading; logged once tracing is installed
    pub warnings: Vec<ConfigWarning>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// Values that do not parse fall back to their defaults and are recorded in
    /// `warnings`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut warnings = Vec::new();

        let db_path = lookup("MENTORSHIP_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(
                || {
                    let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                    PathBuf::from(home).join(".mentorship").join("mentorship.db")
                },
                PathBuf::from,
            );

        let port = match lookup("MENTORSHIP_PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warnings.push(ConfigWarning {
                    var: "MENTORSHIP_PORT",
                    value: raw,
                    fallback: DEFAULT_PORT.to_string(),
                });
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let log_format = match lookup("MENTORSHIP_LOG_FORMAT") {
            None => LogFormat::Json,
            Some(raw) => match raw.trim() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => {
                    warnings.push(ConfigWarning {
                        var: "MENTORSHIP_LOG_FORMAT",
                        value: raw,
                        fallback: "json".to_string(),
                    });
                    LogFormat::Json
                }
            },
        };

        Self {
            db_path,
            port,
            log_format,
            warnings,
        }
    }
}
