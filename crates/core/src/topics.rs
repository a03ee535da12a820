// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane topic layout.
//!
//! All topics live under `m/{domain_id}/c/{channel_id}`. Manager-originated
//! commands go out on `control/manager/...`; proplet-originated messages come
//! in on `control/proplet/...`, which the manager subscribes to with a single
//! `#` filter and dispatches by suffix.

use serde::{Deserialize, Serialize};

/// Builds the concrete topic strings for one domain/channel pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBuilder {
    base: String,
}

impl TopicBuilder {
    pub fn new(domain_id: &str, channel_id: &str) -> Self {
        Self {
            base: format!("m/{domain_id}/c/{channel_id}"),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// START commands to proplets.
    pub fn manager_start(&self) -> String {
        format!("{}/control/manager/start", self.base)
    }

    /// STOP commands to proplets.
    pub fn manager_stop(&self) -> String {
        format!("{}/control/manager/stop", self.base)
    }

    /// Round-aggregate announcements.
    pub fn fl_aggregated(&self) -> String {
        format!("{}/control/manager/fl/aggregated", self.base)
    }

    /// Wildcard filter covering every proplet-originated control message.
    pub fn proplet_filter(&self) -> String {
        format!("{}/control/proplet/#", self.base)
    }

    /// Per-client last-will topic.
    pub fn proplet_offline(&self, client_id: &str) -> String {
        format!("{}/control/proplet/{client_id}/offline", self.base)
    }

    /// Classify a proplet-originated topic by its suffix.
    pub fn classify(&self, topic: &str) -> PropletMessageKind {
        let Some(rest) = topic
            .strip_prefix(self.base.as_str())
            .and_then(|t| t.strip_prefix("/control/proplet/"))
        else {
            return PropletMessageKind::Unknown;
        };
        match rest {
            "create" => PropletMessageKind::Create,
            "alive" => PropletMessageKind::Alive,
            "results" => PropletMessageKind::Results,
            "task_metrics" => PropletMessageKind::TaskMetrics,
            "metrics" => PropletMessageKind::Metrics,
            _ if rest.ends_with("/offline") => PropletMessageKind::Offline,
            _ => PropletMessageKind::Unknown,
        }
    }
}

/// Kind of message on the proplet side of the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropletMessageKind {
    Create,
    Alive,
    Results,
    TaskMetrics,
    Metrics,
    Offline,
    Unknown,
}

#[cfg(test)]
#[path = "topics_tests.rs"]
mod tests;
