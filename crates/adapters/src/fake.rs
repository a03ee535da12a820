// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake pub/sub backend for tests.

use crate::pubsub::{topic_matches, validate_filter, Message, PubSub, PubSubError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// A recorded publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishCall {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Records publishes and lets tests inject inbound messages.
///
/// Publishes are also fanned out to subscribers so end-to-end tests can
/// observe manager-originated traffic.
#[derive(Default)]
pub struct FakePubSub {
    calls: Mutex<Vec<PublishCall>>,
    subscriptions: Mutex<Vec<(String, mpsc::Sender<Message>)>>,
    fail_publish: AtomicBool,
}

impl FakePubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// All publishes in order.
    pub fn calls(&self) -> Vec<PublishCall> {
        self.calls.lock().clone()
    }

    /// Publishes to one exact topic, in order.
    pub fn calls_to(&self, topic: &str) -> Vec<PublishCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.topic == topic)
            .cloned()
            .collect()
    }

    /// Make subsequent publishes fail with a timeout.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Deliver an inbound message to matching subscribers, as the broker would.
    pub async fn inject(&self, topic: &str, payload: serde_json::Value) {
        let senders: Vec<_> = {
            let subscriptions = self.subscriptions.lock();
            subscriptions
                .iter()
                .filter(|(filter, _)| topic_matches(filter, topic))
                .map(|(_, tx)| tx.clone())
                .collect()
        };
        for tx in senders {
            let _ = tx.send((topic.to_string(), payload.clone())).await;
        }
    }
}

#[async_trait]
impl PubSub for FakePubSub {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> Result<(), PubSubError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(PubSubError::Timeout(topic.to_string()));
        }
        self.calls.lock().push(PublishCall {
            topic: topic.to_string(),
            payload: payload.clone(),
        });
        self.inject(topic, payload.clone()).await;
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<Message>, PubSubError> {
        validate_filter(filter)?;
        let (tx, rx) = mpsc::channel(64);
        self.subscriptions.lock().push((filter.to_string(), tx));
        Ok(rx)
    }
}
