//! Channel Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default inbound/outbound queue capacity
pub const DEFAULT_CAPACITY: usize = 64;

/// Default wait for a parent reply on an expect-reply send
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 5_000;

/// Cross-window channel configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Parent origins allowed to post messages (`*` allows all)
    pub allowed_origins: Vec<String>,

    /// Capacity of the inbound and outbound queues
    pub capacity: usize,

    /// How long an expect-reply send waits for the parent
    pub reply_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            capacity: DEFAULT_CAPACITY,
            reply_timeout_ms: DEFAULT_REPLY_TIMEOUT_MS,
        }
    }
}

impl ChannelConfig {
    /// Configuration trusting a single parent origin
    pub fn for_parent(origin: impl Into<String>) -> Self {
        Self {
            allowed_origins: vec![origin.into()],
            ..Default::default()
        }
    }

    /// Reply timeout as Duration
    #[must_use]
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `WIDGET_PARENT_ORIGINS`: comma-separated allowed origins
    /// - `WIDGET_CHANNEL_CAPACITY`: queue capacity
    /// - `WIDGET_REPLY_TIMEOUT_MS`: reply timeout in ms
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an explicit variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(origins) = lookup("WIDGET_PARENT_ORIGINS") {
            config.allowed_origins = split_list(&origins);
        }
        if let Some(capacity) = lookup("WIDGET_CHANNEL_CAPACITY").and_then(|s| s.parse().ok()) {
            config.capacity = capacity;
        }
        if let Some(timeout) = lookup("WIDGET_REPLY_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            config.reply_timeout_ms = timeout;
        }
        config
    }
}

/// Split a comma-separated list, dropping empty items
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
