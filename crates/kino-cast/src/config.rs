//! Cast controller configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application id of the stock media receiver
pub const DEFAULT_MEDIA_RECEIVER_APP_ID: &str = "CC1AD845";

/// Upper bound for `init_retry_delay_ms` (five minutes)
pub const MAX_INIT_RETRY_DELAY_MS: u64 = 300_000;

/// Cast controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Receiver application id (stock media receiver when unset)
    pub app_id: Option<String>,
    /// Capability checks before giving up on initialization
    pub max_init_attempts: u32,
    /// Delay between capability checks in milliseconds
    pub init_retry_delay_ms: u64,
    /// Inactivity timeout to restore when the host reports none (milliseconds)
    pub default_inactivity_timeout_ms: u64,
    /// Autoplay flag for media sent to the receiver
    pub autoplay: bool,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            max_init_attempts: 10,
            init_retry_delay_ms: 1000,
            default_inactivity_timeout_ms: 2000,
            autoplay: true,
        }
    }
}

impl CastConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CastConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_init_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_init_attempts must be at least 1".into(),
            ));
        }
        if self.init_retry_delay_ms > MAX_INIT_RETRY_DELAY_MS {
            return Err(Error::InvalidConfig(format!(
                "init_retry_delay_ms must be at most {MAX_INIT_RETRY_DELAY_MS}"
            )));
        }
        if matches!(&self.app_id, Some(id) if id.trim().is_empty()) {
            return Err(Error::InvalidConfig("app_id must not be blank".into()));
        }
        Ok(())
    }

    /// The receiver application to launch
    pub fn effective_app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or(DEFAULT_MEDIA_RECEIVER_APP_ID)
    }

    pub fn init_retry_delay(&self) -> Duration {
        Duration::from_millis(self.init_retry_delay_ms)
    }
}
