//! Host settings resolved from the environment.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `STUDIO_CONFIG` | channel config file | `<config dir>/design-studio/channel.toml` |
//! | `STUDIO_WS_URL` | endpoint override | value from the config file |
//! | `STUDIO_IDENTITY` | signed-in user id | none (channel stays idle) |
//! | `STUDIO_PROJECT` | initial project | `default` |
//! | `STUDIO_LOG_DIR` | log directory | `<data dir>/design-studio/logs` |
//! | `STUDIO_LOG_LEVEL` | log level | debug in debug builds, info otherwise |
//!
//! A `.env` file in the working directory is loaded first by the binary.

use crate::error::StudioError;
use crate::logger::{DEFAULT_LOG_LEVEL, parse_level};

use channel_core::{ChannelConfig, Identity};

use common::ErrorLocation;

use std::env::temp_dir;
use std::panic::Location;
use std::path::PathBuf;

use log::{LevelFilter, info};

pub const APP_DIR_NAME: &str = "design-studio";
pub const CONFIG_FILE_NAME: &str = "channel.toml";
pub const DEFAULT_PROJECT: &str = "default";

pub const ENV_CONFIG: &str = "STUDIO_CONFIG";
pub const ENV_WS_URL: &str = "STUDIO_WS_URL";
pub const ENV_IDENTITY: &str = "STUDIO_IDENTITY";
pub const ENV_PROJECT: &str = "STUDIO_PROJECT";
pub const ENV_LOG_DIR: &str = "STUDIO_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "STUDIO_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub endpoint_override: Option<String>,
    pub identity: Option<Identity>,
    pub project_id: String,
    pub log_dir: PathBuf,
    pub log_level: LevelFilter,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self, StudioError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolve settings from any variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Config`] for an unrecognized log level.
    pub fn resolve<F>(lookup: F) -> Result<Self, StudioError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let config_path = non_blank(ENV_CONFIG)
            .map(PathBuf::from)
            .unwrap_or_else(default_config_path);

        let log_dir = non_blank(ENV_LOG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(default_log_dir);

        let log_level = match non_blank(ENV_LOG_LEVEL) {
            Some(name) => parse_level(&name).ok_or_else(|| StudioError::Config {
                message: format!("Unrecognized {ENV_LOG_LEVEL} '{name}'"),
                location: ErrorLocation::from(Location::caller()),
            })?,
            None => DEFAULT_LOG_LEVEL,
        };

        Ok(Self {
            config_path,
            endpoint_override: non_blank(ENV_WS_URL),
            identity: lookup(ENV_IDENTITY).and_then(Identity::new),
            project_id: non_blank(ENV_PROJECT).unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
            log_dir,
            log_level,
        })
    }

    /// Load the channel config file and apply the endpoint override.
    ///
    /// # Errors
    ///
    /// Returns [`StudioError::Config`] if the file is invalid or the override is
    /// not a ws/wss URL.
    pub fn channel_config(&self) -> Result<ChannelConfig, StudioError> {
        let mut config =
            ChannelConfig::load(&self.config_path).map_err(|e| StudioError::Config {
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        if let Some(endpoint) = &self.endpoint_override {
            info!("Endpoint overridden by {ENV_WS_URL}: {endpoint}");
            config = config.with_endpoint(endpoint.clone());
            config.validate().map_err(|e| StudioError::Config {
                message: e.to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;
        }

        Ok(config)
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(temp_dir)
        .join(APP_DIR_NAME)
        .join(CONFIG_FILE_NAME)
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(temp_dir)
        .join(APP_DIR_NAME)
        .join("logs")
}
