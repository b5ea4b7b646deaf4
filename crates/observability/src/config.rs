//! Logging configuration, read from environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::record::LogLevel;

pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_FILE_MAX_BYTES: u64 = 50 * 1024;
pub const DEFAULT_FILE_BACKUPS: usize = 10;
pub const DEFAULT_TEAMS_RETRIES: u32 = 3;
pub const DEFAULT_TEAMS_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Config {
        key: String,
        value: String,
        reason: String,
    },

    #[error("log sink i/o: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamsConfig {
    pub webhooks: BTreeMap<LogLevel, String>,
    pub retries: u32,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub endpoint: String,
    pub log_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_enabled: bool,
    pub file_enabled: bool,
    pub file_max_bytes: u64,
    pub file_backups: usize,
    pub telemetry: Option<TelemetryConfig>,
    pub teams: Option<TeamsConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            console_enabled: true,
            file_enabled: true,
            file_max_bytes: DEFAULT_FILE_MAX_BYTES,
            file_backups: DEFAULT_FILE_BACKUPS,
            telemetry: None,
            teams: None,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ObservabilityError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ObservabilityError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let telemetry = if flag(&get, "TELEMETRY_ENABLED", false)? {
            match get("TELEMETRY_ENDPOINT") {
                Some(endpoint) => Some(TelemetryConfig {
                    endpoint,
                    log_group: get("TELEMETRY_LOG_GROUP").unwrap_or_else(|| "habbot".to_string()),
                }),
                None => {
                    tracing::warn!("TELEMETRY_ENABLED is set but TELEMETRY_ENDPOINT is missing; telemetry disabled");
                    None
                }
            }
        } else {
            None
        };

        let teams = if flag(&get, "MS_TEAMS_WEBHOOK_ENABLED", false)? {
            let webhooks = LogLevel::ALL
                .into_iter()
                .filter_map(|level| {
                    get(&format!("MS_TEAMS_{}_ALERTS_WEBHOOK_URL", level.as_str())).map(|url| (level, url))
                })
                .collect();
            let retries = number(&get, "MS_TEAMS_MESSAGE_SEND_RETRIES", DEFAULT_TEAMS_RETRIES)?;
            let delay_secs = number(
                &get,
                "MS_TEAMS_MESSAGE_RETRY_TIMEOUT_IN_SECONDS",
                DEFAULT_TEAMS_RETRY_DELAY.as_secs(),
            )?;
            Some(TeamsConfig {
                webhooks,
                retries,
                retry_delay: Duration::from_secs(delay_secs),
            })
        } else {
            None
        };

        Ok(Self {
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            console_enabled: flag(&get, "LOG_CONSOLE_ENABLED", defaults.console_enabled)?,
            file_enabled: flag(&get, "LOG_FILE_ENABLED", defaults.file_enabled)?,
            file_max_bytes: number(&get, "LOG_FILE_MAX_BYTES", defaults.file_max_bytes)?,
            file_backups: number(&get, "LOG_FILE_BACKUPS", defaults.file_backups)?,
            telemetry,
            teams,
        })
    }
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ObservabilityError {
    ObservabilityError::Config {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn flag(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ObservabilityError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &raw, "expected a boolean")),
        },
    }
}

pub fn number<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ObservabilityError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, &raw, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<LoggingConfig, ObservabilityError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        LoggingConfig::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, LoggingConfig::default());
        assert_eq!(cfg.file_max_bytes, 51_200);
        assert_eq!(cfg.file_backups, 10);
    }

    #[test]
    fn teams_webhooks_per_level() {
        let cfg = config(&[
            ("MS_TEAMS_WEBHOOK_ENABLED", "true"),
            ("MS_TEAMS_ERROR_ALERTS_WEBHOOK_URL", "https://hooks.example/error"),
            ("MS_TEAMS_MESSAGE_SEND_RETRIES", "5"),
        ])
        .unwrap();
        let teams = cfg.teams.unwrap();
        assert_eq!(teams.webhooks.len(), 1);
        assert_eq!(teams.webhooks[&LogLevel::Error], "https://hooks.example/error");
        assert_eq!(teams.retries, 5);
        assert_eq!(teams.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn disabled_teams_ignores_urls() {
        let cfg = config(&[("MS_TEAMS_ERROR_ALERTS_WEBHOOK_URL", "https://hooks.example/error")]).unwrap();
        assert!(cfg.teams.is_none());
    }

    #[test]
    fn invalid_numbers_and_flags_are_errors() {
        let err = config(&[("LOG_FILE_MAX_BYTES", "lots")]).unwrap_err();
        assert!(err.to_string().contains("LOG_FILE_MAX_BYTES"));
        assert!(config(&[("LOG_FILE_ENABLED", "maybe")]).is_err());
    }

    #[test]
    fn telemetry_needs_an_endpoint() {
        assert!(config(&[("TELEMETRY_ENABLED", "1")]).unwrap().telemetry.is_none());
        let cfg = config(&[("TELEMETRY_ENABLED", "1"), ("TELEMETRY_ENDPOINT", "http://collector/logs")]).unwrap();
        assert_eq!(cfg.telemetry.unwrap().log_group, "habbot");
    }
}
