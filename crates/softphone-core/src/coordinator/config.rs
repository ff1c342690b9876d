use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{SoftphoneError, SoftphoneResult};

/// RFC 3261 round-trip estimate
pub const DEFAULT_T1_MS: u64 = 500;

/// Largest accepted T1
pub const MAX_T1_MS: u64 = 60_000;

/// Largest accepted grace multiplier
pub const MAX_GRACE_MULTIPLIER: u32 = 100;

/// Configuration for the softphone coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftphoneConfig {
    /// SIP timer T1 in milliseconds
    pub t1_ms: u64,
    /// Shutdown waits `grace_multiplier * T1` for the registrar before exiting anyway
    pub grace_multiplier: u32,
    /// Host part of locally generated Call-IDs
    pub local_host: String,
    /// Maximum number of signaling commands in flight
    pub max_concurrent_commands: usize,
    /// Buffer size of the presentation event channel
    pub event_channel_capacity: usize,
    /// Remove terminated sessions without waiting for the presentation to dismiss them
    pub auto_dismiss_terminated: bool,
    /// JSON file holding the account; `None` keeps it in memory only
    pub credentials_path: Option<PathBuf>,
}

impl SoftphoneConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            t1_ms: DEFAULT_T1_MS,
            grace_multiplier: 3,
            local_host: "127.0.0.1".to_string(),
            max_concurrent_commands: 16,
            event_channel_capacity: 256,
            auto_dismiss_terminated: false,
            credentials_path: None,
        }
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> SoftphoneResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SoftphoneError::InvalidConfiguration {
            field: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| SoftphoneError::InvalidConfiguration {
            field: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_t1(mut self, t1: Duration) -> Self {
        self.t1_ms = t1.as_millis() as u64;
        self
    }

    pub fn with_grace_multiplier(mut self, multiplier: u32) -> Self {
        self.grace_multiplier = multiplier;
        self
    }

    pub fn with_local_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = host.into();
        self
    }

    pub fn with_max_concurrent_commands(mut self, max: usize) -> Self {
        self.max_concurrent_commands = max;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_auto_dismiss(mut self, enabled: bool) -> Self {
        self.auto_dismiss_terminated = enabled;
        self
    }

    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    pub fn t1(&self) -> Duration {
        Duration::from_millis(self.t1_ms)
    }

    /// How long shutdown waits for the registrar
    pub fn grace_period(&self) -> Duration {
        self.t1().saturating_mul(self.grace_multiplier)
    }

    pub fn validate(&self) -> SoftphoneResult<()> {
        let invalid = |field: &str, reason: &str| {
            Err(SoftphoneError::InvalidConfiguration { field: field.to_string(), reason: reason.to_string() })
        };

        if self.t1_ms == 0 || self.t1_ms > MAX_T1_MS {
            return invalid("t1_ms", "must be between 1 and 60000");
        }
        if self.grace_multiplier == 0 || self.grace_multiplier > MAX_GRACE_MULTIPLIER {
            return invalid("grace_multiplier", "must be between 1 and 100");
        }
        if self.max_concurrent_commands == 0 || self.max_concurrent_commands > Semaphore::MAX_PERMITS {
            return invalid("max_concurrent_commands", "must be greater than zero and fit a semaphore");
        }
        if self.event_channel_capacity == 0 || self.event_channel_capacity > usize::MAX / 2 {
            return invalid("event_channel_capacity", "must be greater than zero and at most usize::MAX / 2");
        }
        Ok(())
    }
}

impl Default for SoftphoneConfig {
    fn default() -> Self {
        Self::new()
    }
}
