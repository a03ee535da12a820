// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager configuration: TOML file with environment overrides.

use propeller_engine::SchedulerAlgorithm;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Manager daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Messaging domain id (topic prefix segment).
    pub domain_id: String,
    /// Messaging channel id (topic prefix segment).
    pub channel_id: String,
    /// Seconds a proplet stays alive after its last liveness message.
    pub alive_timeout_s: u64,
    /// Publish timeout in milliseconds.
    pub publish_timeout_ms: u64,
    /// Proplet selection algorithm: round-robin, least-loaded, or random.
    pub scheduler: String,
    /// External FL coordinator URL; usually supplied via FL_COORDINATOR_URL.
    pub coordinator_url: Option<String>,
    /// Optional log file; stderr when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain_id: "domain".to_string(),
            channel_id: "control".to_string(),
            alive_timeout_s: 10,
            publish_timeout_ms: 5_000,
            scheduler: "round-robin".to_string(),
            coordinator_url: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides
    /// (`PROPELLER_DOMAIN_ID`, `PROPELLER_CHANNEL_ID`, `PROPELLER_SCHEDULER`,
    /// `FL_COORDINATOR_URL`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };

        if let Ok(domain) = std::env::var("PROPELLER_DOMAIN_ID") {
            config.domain_id = domain;
        }
        if let Ok(channel) = std::env::var("PROPELLER_CHANNEL_ID") {
            config.channel_id = channel;
        }
        if let Ok(scheduler) = std::env::var("PROPELLER_SCHEDULER") {
            config.scheduler = scheduler;
        }
        if let Ok(url) = std::env::var(propeller_adapters::COORDINATOR_URL_ENV) {
            if !url.trim().is_empty() {
                config.coordinator_url = Some(url);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.domain_id.trim().is_empty() || self.channel_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "domain_id and channel_id are required".to_string(),
            ));
        }
        self.scheduler_algorithm()?;
        Ok(())
    }

    pub fn scheduler_algorithm(&self) -> Result<SchedulerAlgorithm, ConfigError> {
        self.scheduler
            .parse::<SchedulerAlgorithm>()
            .map_err(ConfigError::Invalid)
    }

    pub fn alive_timeout(&self) -> Duration {
        Duration::from_secs(self.alive_timeout_s)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
