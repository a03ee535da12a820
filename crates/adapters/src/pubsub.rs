// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pub/sub port.
//!
//! Best-effort at-least-once topic broker: a publish that times out surfaces
//! an error so the caller can run its compensating action, and subscribers
//! must tolerate duplicate delivery.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// A delivered message: `(topic, decoded payload)`.
pub type Message = (String, serde_json::Value);

/// Errors surfaced by a pub/sub backend.
#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("publish to {0} timed out")]
    Timeout(String),
    #[error("connection closed")]
    Closed,
    #[error("invalid topic filter: {0}")]
    InvalidFilter(String),
    #[error("transport error: {0}")]
    Backend(String),
}

/// Last-will-and-testament published by the broker when a client drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Topic broker port.
///
/// Filters support MQTT-style wildcards: `+` matches one level, `#` matches
/// the remainder (last segment only).
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish a JSON payload to a concrete topic.
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), PubSubError>;

    /// Subscribe to a topic filter; messages arrive on the returned channel.
    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<Message>, PubSubError>;
}

/// Match a topic against a wildcard filter.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Reject malformed filters (`#` not last, wildcards embedded in a level).
pub fn validate_filter(filter: &str) -> Result<(), PubSubError> {
    if filter.is_empty() {
        return Err(PubSubError::InvalidFilter(filter.to_string()));
    }
    let levels: Vec<&str> = filter.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        let last = i == levels.len() - 1;
        match *level {
            "#" if !last => return Err(PubSubError::InvalidFilter(filter.to_string())),
            "#" | "+" => {}
            l if l.contains('#') || l.contains('+') => {
                return Err(PubSubError::InvalidFilter(filter.to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "pubsub_tests.rs"]
mod tests;
