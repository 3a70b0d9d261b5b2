//! Widget Configuration
//!
//! Configuration for one widget instance, loaded from a TOML file at
//! `~/.config/chat-widget/widget.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments (host binary, via [`ConfigOverrides`])
//! 2. Environment variables (`WIDGET_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [channel]
//! allowed_origins = ["https://www.example.com"]
//! capacity = 64
//! reply_timeout_ms = 5000
//!
//! [backend]
//! endpoint = "https://bot.example.com/turn"
//! timeout_ms = 30000
//!
//! [transcript]
//! max_entries = 500
//! max_content_bytes = 1048576
//!
//! [ui]
//! locales = "en_US,fr_FR"
//! enable_live_chat = true
//! show_error_details = false
//! running_embedded = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::http::DEFAULT_TIMEOUT_MS;
use crate::transport::config::split_list;
use crate::transport::ChannelConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Where the effective configuration last came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Command-line argument
    Cli,
    /// Environment variable
    Env,
    /// TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[channel]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelToml {
    /// Parent origins allowed to post messages
    pub allowed_origins: Option<Vec<String>>,
    /// Queue capacity
    pub capacity: Option<usize>,
    /// Expect-reply timeout in milliseconds
    pub reply_timeout_ms: Option<u64>,
}

/// `[backend]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Dialog backend URL
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// `[transcript]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptToml {
    /// Maximum entries kept (0 = unlimited)
    pub max_entries: Option<usize>,
    /// Maximum text bytes kept (0 = unlimited)
    pub max_content_bytes: Option<usize>,
}

/// `[ui]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiToml {
    /// Comma-separated locale list, active first
    pub locales: Option<String>,
    /// Whether users may escalate to a live agent
    pub enable_live_chat: Option<bool>,
    /// Put backend error text in the transcript
    pub show_error_details: Option<bool>,
    /// The widget runs inside a parent page's frame
    pub running_embedded: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetToml {
    /// Channel section
    pub channel: ChannelToml,
    /// Backend section
    pub backend: BackendToml,
    /// Transcript section
    pub transcript: TranscriptToml,
    /// UI section
    pub ui: UiToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Dialog backend settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    /// Endpoint URL; `None` leaves the choice of backend to the host
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl BackendSettings {
    /// Request timeout as Duration
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Effective configuration of one widget
#[derive(Clone, Debug)]
pub struct WidgetConfig {
    /// Cross-window channel
    pub channel: ChannelConfig,
    /// Dialog backend
    pub backend: BackendSettings,
    /// Maximum transcript entries (0 = unlimited)
    pub transcript_max_entries: usize,
    /// Maximum transcript text bytes (0 = unlimited)
    pub transcript_max_bytes: usize,
    /// Supported locales, active first
    pub locales: Vec<String>,
    /// Whether users may escalate to a live agent
    pub enable_live_chat: bool,
    /// Put backend error text in the transcript
    pub show_error_details: bool,
    /// The widget runs inside a parent page's frame
    pub running_embedded: bool,
    /// Config file that was loaded, if any
    pub config_file_path: Option<PathBuf>,
    source: ConfigSource,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            backend: BackendSettings {
                endpoint: None,
                timeout_ms: DEFAULT_TIMEOUT_MS,
            },
            transcript_max_entries: 500,
            transcript_max_bytes: 1024 * 1024,
            locales: vec!["en_US".to_string()],
            enable_live_chat: false,
            show_error_details: false,
            running_embedded: true,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl WidgetConfig {
    /// Configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the configuration last came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would leave the widget unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        if self.channel.reply_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "reply timeout must be positive".to_string(),
            ));
        }
        if self.locales.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one locale is required".to_string(),
            ));
        }
        if self.running_embedded && self.channel.allowed_origins.is_empty() {
            tracing::warn!("Running embedded with no allowed parent origins; all parent messages will be dropped");
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chat-widget/widget.toml` or
/// `~/.config/chat-widget/widget.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chat-widget").join("widget.toml"))
}

/// Load configuration from the default path and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<WidgetConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the environment
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<WidgetConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
pub fn load_config_with_env(
    path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<WidgetConfig, ConfigError> {
    let mut config = WidgetConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: WidgetToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(path = %config_path.display(), "Config file not found, using defaults");
        }
    }

    apply_env_config(&mut config, lookup);

    Ok(config)
}

fn apply_toml_config(config: &mut WidgetConfig, toml: &WidgetToml) {
    if let Some(ref origins) = toml.channel.allowed_origins {
        config.channel.allowed_origins = origins.clone();
    }
    if let Some(capacity) = toml.channel.capacity {
        config.channel.capacity = capacity;
    }
    if let Some(timeout) = toml.channel.reply_timeout_ms {
        config.channel.reply_timeout_ms = timeout;
    }

    if toml.backend.endpoint.is_some() {
        config.backend.endpoint = toml.backend.endpoint.clone();
    }
    if let Some(timeout) = toml.backend.timeout_ms {
        config.backend.timeout_ms = timeout;
    }

    if let Some(max) = toml.transcript.max_entries {
        config.transcript_max_entries = max;
    }
    if let Some(max) = toml.transcript.max_content_bytes {
        config.transcript_max_bytes = max;
    }

    if let Some(ref locales) = toml.ui.locales {
        config.locales = split_list(locales);
    }
    if let Some(enabled) = toml.ui.enable_live_chat {
        config.enable_live_chat = enabled;
    }
    if let Some(show) = toml.ui.show_error_details {
        config.show_error_details = show;
    }
    if let Some(embedded) = toml.ui.running_embedded {
        config.running_embedded = embedded;
    }
}

fn parse_bool(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

fn apply_env_config(config: &mut WidgetConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(origins) = lookup("WIDGET_PARENT_ORIGINS") {
        config.channel.allowed_origins = split_list(&origins);
        config.source = ConfigSource::Env;
    }
    if let Some(capacity) = lookup("WIDGET_CHANNEL_CAPACITY").and_then(|v| v.parse().ok()) {
        config.channel.capacity = capacity;
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = lookup("WIDGET_REPLY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.channel.reply_timeout_ms = timeout;
        config.source = ConfigSource::Env;
    }
    if let Some(endpoint) = lookup("WIDGET_BACKEND_URL") {
        config.backend.endpoint = Some(endpoint);
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = lookup("WIDGET_BACKEND_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.backend.timeout_ms = timeout;
        config.source = ConfigSource::Env;
    }
    if let Some(locales) = lookup("WIDGET_LOCALES") {
        config.locales = split_list(&locales);
        config.source = ConfigSource::Env;
    }
    if let Some(enabled) = lookup("WIDGET_LIVE_CHAT") {
        config.enable_live_chat = parse_bool(&enabled);
        config.source = ConfigSource::Env;
    }
    if let Some(show) = lookup("WIDGET_SHOW_ERROR_DETAILS") {
        config.show_error_details = parse_bool(&show);
        config.source = ConfigSource::Env;
    }
    if let Some(embedded) = lookup("WIDGET_EMBEDDED") {
        config.running_embedded = parse_bool(&embedded);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values set on the command line
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Allowed parent origins
    pub allowed_origins: Option<Vec<String>>,
    /// Dialog backend URL
    pub backend_endpoint: Option<String>,
    /// Locale list
    pub locales: Option<Vec<String>>,
    /// Live chat enabled
    pub enable_live_chat: Option<bool>,
    /// Error details in transcript
    pub show_error_details: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origins override
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    /// Set backend endpoint override
    #[must_use]
    pub fn with_backend_endpoint(mut self, endpoint: String) -> Self {
        self.backend_endpoint = Some(endpoint);
        self
    }

    /// Set locale list override
    #[must_use]
    pub fn with_locales(mut self, locales: Vec<String>) -> Self {
        self.locales = Some(locales);
        self
    }

    /// Set live chat override
    #[must_use]
    pub fn with_live_chat(mut self, enabled: bool) -> Self {
        self.enable_live_chat = Some(enabled);
        self
    }

    /// Set error details override
    #[must_use]
    pub fn with_error_details(mut self, show: bool) -> Self {
        self.show_error_details = Some(show);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut WidgetConfig) {
        if self.allowed_origins.is_some()
            || self.backend_endpoint.is_some()
            || self.locales.is_some()
            || self.enable_live_chat.is_some()
            || self.show_error_details.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref origins) = self.allowed_origins {
            config.channel.allowed_origins = origins.clone();
        }
        if let Some(ref endpoint) = self.backend_endpoint {
            config.backend.endpoint = Some(endpoint.clone());
        }
        if let Some(ref locales) = self.locales {
            config.locales = locales.clone();
        }
        if let Some(enabled) = self.enable_live_chat {
            config.enable_live_chat = enabled;
        }
        if let Some(show) = self.show_error_details {
            config.show_error_details = show;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
