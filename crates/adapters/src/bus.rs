// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process topic broker.
//!
//! Default transport for a single-node manager and for tests. Fan-out is a
//! wildcard match over registered subscriptions; a slow subscriber surfaces
//! as a publish timeout, mirroring how a real broker applies backpressure.

use crate::pubsub::{topic_matches, validate_filter, LastWill, Message, PubSub, PubSubError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 64;

struct Subscription {
    filter: String,
    tx: mpsc::Sender<Message>,
}

/// Topic broker living inside the manager process.
pub struct InProcessBus {
    subscriptions: Mutex<Vec<Subscription>>,
    publish_timeout: Duration,
    last_will: Mutex<Option<LastWill>>,
}

impl InProcessBus {
    pub fn new(publish_timeout: Duration) -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            publish_timeout,
            last_will: Mutex::new(None),
        }
    }

    /// Configure the last-will message published on [`InProcessBus::disconnect`].
    pub fn set_last_will(&self, will: LastWill) {
        *self.last_will.lock() = Some(will);
    }

    /// Simulate an ungraceful disconnect: deliver the configured last will.
    pub async fn disconnect(&self) -> Result<(), PubSubError> {
        let will = self.last_will.lock().take();
        match will {
            Some(will) => self.publish(&will.topic, &will.payload).await,
            None => Ok(()),
        }
    }

    fn matching_senders(&self, topic: &str) -> Vec<mpsc::Sender<Message>> {
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|s| !s.tx.is_closed());
        subscriptions
            .iter()
            .filter(|s| topic_matches(&s.filter, topic))
            .map(|s| s.tx.clone())
            .collect()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl PubSub for InProcessBus {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), PubSubError> {
        let senders = self.matching_senders(topic);
        tracing::trace!(topic, subscribers = senders.len(), "publishing");
        for tx in senders {
            let message = (topic.to_string(), payload.clone());
            match tokio::time::timeout(self.publish_timeout, tx.send(message)).await {
                Ok(Ok(())) => {}
                // Receiver dropped between match and send; at-least-once, not exactly-once
                Ok(Err(_)) => {}
                Err(_) => return Err(PubSubError::Timeout(topic.to_string())),
            }
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<Message>, PubSubError> {
        validate_filter(filter)?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.subscriptions.lock().push(Subscription {
            filter: filter.to_string(),
            tx,
        });
        Ok(rx)
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
