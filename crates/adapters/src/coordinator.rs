// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for an external FL coordinator.
//!
//! Forwarding is a legacy alias for direct client-to-coordinator traffic;
//! the in-manager aggregator stays authoritative whether or not a
//! coordinator is configured.

use std::time::Duration;
use thiserror::Error;

/// Environment variable enabling experiment forwarding.
pub const COORDINATOR_URL_ENV: &str = "FL_COORDINATOR_URL";

const FORWARD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("coordinator http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Thin forwarder for experiment configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    base_url: String,
    http: reqwest::Client,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CoordinatorError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().timeout(FORWARD_TIMEOUT).build()?;
        Ok(Self { base_url, http })
    }

    /// Build a client from `FL_COORDINATOR_URL`, if set and non-empty.
    pub fn from_env() -> Result<Option<Self>, CoordinatorError> {
        match std::env::var(COORDINATOR_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(Some(Self::new(url)?)),
            _ => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST an experiment configuration to the coordinator.
    pub async fn forward_experiment(
        &self,
        experiment: &serde_json::Value,
    ) -> Result<(), CoordinatorError> {
        self.http
            .post(format!("{}/experiments", self.base_url))
            .json(experiment)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
