// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription pump for proplet-originated control messages.
//!
//! One wildcard subscription covers the whole proplet side; messages are
//! dispatched by topic suffix. Handlers log and continue: the bus is
//! at-least-once and duplicates are expected.

use propeller_adapters::Message;
use propeller_core::{
    OfflinePayload, PropletAnnouncement, PropletMessageKind, ResultsMessage, SystemClock,
    TopicBuilder,
};
use propeller_engine::{PropletRegistry, ResultIngestion};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Drain the subscription until cancellation or channel close.
pub async fn pump(
    mut receiver: mpsc::Receiver<Message>,
    registry: Arc<PropletRegistry<SystemClock>>,
    ingestion: Arc<ResultIngestion<SystemClock>>,
    topics: TopicBuilder,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("control pump stopped");
                return;
            }
            message = receiver.recv() => {
                let Some((topic, payload)) = message else {
                    tracing::debug!("control subscription closed");
                    return;
                };
                dispatch(&topic, payload, &registry, &ingestion, &topics).await;
            }
        }
    }
}

/// Route one control message by topic suffix.
pub async fn dispatch(
    topic: &str,
    payload: serde_json::Value,
    registry: &PropletRegistry<SystemClock>,
    ingestion: &ResultIngestion<SystemClock>,
    topics: &TopicBuilder,
) {
    match topics.classify(topic) {
        PropletMessageKind::Create => {
            match serde_json::from_value::<PropletAnnouncement>(payload) {
                Ok(announcement) => {
                    if let Err(e) = registry.handle_create(&announcement.proplet_id).await {
                        tracing::warn!(topic, error = %e, "create handler failed");
                    }
                }
                Err(e) => tracing::warn!(topic, error = %e, "malformed create message"),
            }
        }
        PropletMessageKind::Alive => {
            match serde_json::from_value::<PropletAnnouncement>(payload) {
                Ok(announcement) => {
                    if let Err(e) = registry.handle_alive(&announcement.proplet_id).await {
                        tracing::warn!(topic, error = %e, "alive handler failed");
                    }
                }
                Err(e) => tracing::warn!(topic, error = %e, "malformed alive message"),
            }
        }
        PropletMessageKind::Offline => match serde_json::from_value::<OfflinePayload>(payload) {
            Ok(offline) => {
                if let Err(e) = registry.handle_offline(&offline.proplet_id).await {
                    tracing::warn!(topic, error = %e, "offline handler failed");
                }
            }
            Err(e) => tracing::warn!(topic, error = %e, "malformed offline message"),
        },
        PropletMessageKind::Results => match serde_json::from_value::<ResultsMessage>(payload) {
            Ok(message) => {
                if let Err(e) = ingestion.handle(message).await {
                    tracing::warn!(topic, error = %e, "result rejected");
                }
            }
            Err(e) => tracing::warn!(topic, error = %e, "malformed results message"),
        },
        PropletMessageKind::TaskMetrics | PropletMessageKind::Metrics => {
            tracing::debug!(topic, "metrics message received");
        }
        PropletMessageKind::Unknown => {
            tracing::debug!(topic, "unhandled control message");
        }
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
