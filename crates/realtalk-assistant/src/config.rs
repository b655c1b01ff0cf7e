//! Client configuration loading from file and environment variables.

use realtalk_voice::RealtimeConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Credential minting and realtime endpoint settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Email notification backend.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Reconnect, timeout and heartbeat policy.
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Assistant persona settings.
    #[serde(default)]
    pub assistant: AssistantSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where saved messages are forwarded.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// The `/send-email` endpoint.
    #[serde(default = "default_notify_url")]
    pub url: String,

    /// Address that receives every saved message.
    #[serde(default = "default_recipient")]
    pub recipient: String,

    /// Prepended to every subject line when non-empty.
    #[serde(default)]
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
    /// Retries allowed before the session is closed for good.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Retry `n` waits `n * reconnect_base_delay_ms`.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistantSettings {
    /// JSON file replacing the embedded biography.
    #[serde(default)]
    pub biography_path: Option<String>,

    /// Voice requested in `session.update`.
    #[serde(default)]
    pub voice: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "realtalk_assistant=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_notify_url() -> String {
    "http://127.0.0.1:8000/send-email".to_string()
}

fn default_recipient() -> String {
    "owner@example.com".to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    2_000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            url: default_notify_url(),
            recipient: default_recipient(),
            subject_prefix: String::new(),
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
        }
    }
}

impl SupervisorSettings {
    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Rejects values the supervisor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.realtime
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.notify.url.trim().is_empty() {
            return Err(ConfigError::Invalid("notify.url must not be empty".to_string()));
        }
        if self.notify.recipient.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "notify.recipient must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("supervisor.connect_timeout_ms", self.supervisor.connect_timeout_ms),
            ("supervisor.heartbeat_interval_ms", self.supervisor.heartbeat_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration parsed but is unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `REALTALK_SESSION_URL` overrides `realtime.session_url`
/// - `REALTALK_REALTIME_URL` overrides `realtime.realtime_url`
/// - `REALTALK_MODEL` overrides `realtime.model`
/// - `REALTALK_NOTIFY_URL` overrides `notify.url`
/// - `REALTALK_NOTIFY_TO` overrides `notify.recipient`
/// - `REALTALK_MAX_RECONNECT_ATTEMPTS` overrides `supervisor.max_reconnect_attempts`
/// - `REALTALK_LOG_LEVEL` overrides `logging.level`
/// - `REALTALK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the resulting configuration fails validation.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Applies the `REALTALK_*` overrides, reading variables through `lookup`.
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("REALTALK_SESSION_URL") {
        config.realtime.session_url = url;
    }
    if let Some(url) = lookup("REALTALK_REALTIME_URL") {
        config.realtime.realtime_url = url;
    }
    if let Some(model) = lookup("REALTALK_MODEL") {
        config.realtime.model = Some(model).filter(|m| !m.trim().is_empty());
    }
    if let Some(url) = lookup("REALTALK_NOTIFY_URL") {
        config.notify.url = url;
    }
    if let Some(to) = lookup("REALTALK_NOTIFY_TO") {
        config.notify.recipient = to;
    }
    if let Some(max) = lookup("REALTALK_MAX_RECONNECT_ATTEMPTS") {
        if let Ok(parsed) = max.parse() {
            config.supervisor.max_reconnect_attempts = parsed;
        }
    }
    if let Some(level) = lookup("REALTALK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("REALTALK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
