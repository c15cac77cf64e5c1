//! Channel configuration.
//!
//! Loaded from a TOML file; every field has a default so a missing file, or a
//! file that only overrides the endpoint, is valid.

mod identity;

pub use identity::Identity;

use crate::error::config::ConfigError;
use crate::{CHANNEL_DEFAULT_ENDPOINT, CHANNEL_IDENTITY_PARAM, DEFAULT_MAX_RECONNECT_ATTEMPTS};

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use url::Url;

const MAX_RECONNECT_ATTEMPTS_CEILING: u32 = 16;

// ============================================
// CONFIG STRUCT
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Base WebSocket URL of the job peer.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Query parameter that carries the identity.
    #[serde(default = "default_identity_param")]
    pub identity_param: String,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Backoff unit: retry `n` (0-indexed) waits `base_delay_ms * 2^n`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            identity_param: default_identity_param(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            base_delay_ms: default_base_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_endpoint() -> String {
    CHANNEL_DEFAULT_ENDPOINT.to_string()
}
fn default_identity_param() -> String {
    CHANNEL_IDENTITY_PARAM.to_string()
}
fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

// ============================================
// IMPLEMENTATION
// ============================================

impl ChannelConfig {
    /// Load config from a TOML file.
    ///
    /// # Returns
    ///
    /// Returns defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(
                "Channel config not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: ChannelConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;

        info!("Channel config loaded from {}", path.display());
        Ok(config)
    }

    /// Replace the endpoint, e.g. from an environment override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] or [`ConfigError::EndpointError`] if any value
    /// is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.identity_param.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "identity_param cannot be empty".to_string(),
            });
        }

        if self.max_reconnect_attempts == 0
            || self.max_reconnect_attempts > MAX_RECONNECT_ATTEMPTS_CEILING
        {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid max_reconnect_attempts: {} (must be 1-{MAX_RECONNECT_ATTEMPTS_CEILING})",
                    self.max_reconnect_attempts
                ),
            });
        }

        if self.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "base_delay_ms must be greater than zero".to_string(),
            });
        }

        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "connect_timeout_ms must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Endpoint URL for one identity: the base endpoint plus
    /// `identity_param=<identity>` in the query string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EndpointError`] if the base endpoint is not a ws/wss URL.
    pub fn endpoint_for(&self, identity: &Identity) -> Result<Url, ConfigError> {
        let mut url = self.base_url()?;
        url.query_pairs_mut()
            .append_pair(&self.identity_param, identity.as_str());
        Ok(url)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[track_caller]
    fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint).map_err(|e| ConfigError::EndpointError {
            location: ErrorLocation::from(Location::caller()),
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::EndpointError {
                location: ErrorLocation::from(Location::caller()),
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme '{other}' (expected ws or wss)"),
            }),
        }
    }
}
