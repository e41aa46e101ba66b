//! Configuration system for dashsync
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (DASHSYNC_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};
use crate::fetch::validate_http_url;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Push stream settings
    pub stream: StreamSettings,

    /// Polling and refresh settings
    pub polling: PollingSettings,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// Persistent state
    pub storage: StorageSettings,
}

/// Push stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// WebSocket endpoint (unset = no stream)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Sub-protocols offered in the handshake
    pub protocols: Vec<String>,

    /// Reconnect after an unexpected close
    pub auto_reconnect: bool,

    /// Fixed delay between reconnect attempts in milliseconds
    pub reconnect_interval_ms: u64,

    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
}

/// Polling and refresh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// HTTP(S) endpoint returning the full JSON value (unset = no polling)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_url: Option<String>,

    /// Polling period in milliseconds (0 = manual refresh only)
    pub refresh_interval_ms: u64,

    /// Start with auto-refresh enabled
    pub auto_refresh: bool,

    /// Per-request timeout in milliseconds
    pub fetch_timeout_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Keyed store file
    pub store_file: String,

    /// Key under which `watch` saves the last value
    pub store_key: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: None,
            protocols: vec![],
            auto_reconnect: true,
            reconnect_interval_ms: 5000,
            max_reconnect_attempts: 10,
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            fetch_url: None,
            refresh_interval_ms: 30000,
            auto_refresh: true,
            fetch_timeout_ms: 30000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            store_file: "~/.dashsync/store.json".to_string(),
            store_key: "watch".to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = Self::parse(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML document without overrides or validation
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.message().to_string(),
            source: Some(e),
        })
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("dashsync.toml"),
            dirs::config_dir()
                .map(|p| p.join("dashsync").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".dashsync").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `DASHSYNC_*` overrides from an arbitrary lookup
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Stream settings
        if let Some(val) = lookup("DASHSYNC_STREAM_URL") {
            self.stream.url = non_empty(val);
        }
        if let Some(val) = lookup("DASHSYNC_STREAM_PROTOCOLS") {
            self.stream.protocols = val
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = lookup("DASHSYNC_AUTO_RECONNECT") {
            self.stream.auto_reconnect = parse_bool(&val);
        }
        if let Some(n) = lookup("DASHSYNC_RECONNECT_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.stream.reconnect_interval_ms = n;
        }
        if let Some(n) = lookup("DASHSYNC_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.stream.max_reconnect_attempts = n;
        }

        // Polling settings
        if let Some(val) = lookup("DASHSYNC_FETCH_URL") {
            self.polling.fetch_url = non_empty(val);
        }
        if let Some(n) = lookup("DASHSYNC_REFRESH_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.polling.refresh_interval_ms = n;
        }
        if let Some(val) = lookup("DASHSYNC_AUTO_REFRESH") {
            self.polling.auto_refresh = parse_bool(&val);
        }

        // Logging settings
        if let Some(val) = lookup("DASHSYNC_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("DASHSYNC_LOG_FILE") {
            self.logging.file = non_empty(val);
        }
        if let Some(val) = lookup("DASHSYNC_LOG_JSON") {
            self.logging.json_format = parse_bool(&val);
        }

        // Storage settings
        if let Some(val) = lookup("DASHSYNC_STORE_FILE") {
            self.storage.store_file = val;
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        self.storage.store_file = expand_path(&self.storage.store_file);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.stream.url {
            let parsed = url::Url::parse(url).map_err(|e| {
                Error::config_field_invalid("stream.url", format!("'{}' is not a valid URL: {}", url, e))
            })?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(Error::config_field_invalid(
                    "stream.url",
                    "Stream URL must start with ws:// or wss://",
                ));
            }
        }

        if self.stream.auto_reconnect && self.stream.reconnect_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "stream.reconnect_interval_ms",
                "reconnect_interval_ms must be greater than 0 when auto_reconnect is on",
            ));
        }

        if let Some(url) = &self.polling.fetch_url {
            validate_http_url(url)
                .map_err(|e| Error::config_field_invalid("polling.fetch_url", e.to_string()))?;
        }

        if self.polling.fetch_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "polling.fetch_timeout_ms",
                "fetch_timeout_ms must be greater than 0",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Connection manager settings for the stream
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            auto_reconnect: self.stream.auto_reconnect,
            reconnect_interval: Duration::from_millis(self.stream.reconnect_interval_ms),
            max_reconnect_attempts: self.stream.max_reconnect_attempts,
            protocols: self.stream.protocols.clone(),
        }
    }

    /// Polling period
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.polling.refresh_interval_ms)
    }

    /// Per-request fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.polling.fetch_timeout_ms)
    }

    /// Get the store file as a PathBuf
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.store_file)
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

fn non_empty(val: String) -> Option<String> {
    if val.trim().is_empty() {
        None
    } else {
        Some(val)
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location used by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dashsync")
        .join("config.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    println!("Configuration file created: {}", config_path.display());
    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# dashsync configuration

[stream]
# WebSocket endpoint pushing updates (comment out to disable the stream)
# url = "wss://dashboard.example.com/live"

# Sub-protocols offered in the handshake
protocols = []

# Reconnect after an unexpected close
auto_reconnect = true

# Fixed delay between reconnect attempts in milliseconds
reconnect_interval_ms = 5000

# Reconnect attempts before giving up (manual reconnect resets the count)
max_reconnect_attempts = 10

[polling]
# HTTP(S) endpoint returning the full JSON value (comment out to disable polling)
# fetch_url = "https://dashboard.example.com/api/stats"

# Polling period in milliseconds (0 = manual refresh only)
refresh_interval_ms = 30000

# Start with auto-refresh enabled
auto_refresh = true

# Per-request timeout in milliseconds
fetch_timeout_ms = 30000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.dashsync/logs/dashsync.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

[storage]
# Keyed store file
store_file = "~/.dashsync/store.json"

# Key under which `watch` saves the last value
store_key = "watch"
"#
    .to_string()
}
