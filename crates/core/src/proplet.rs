// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proplet record and liveness model.

use serde::{Deserialize, Serialize};
use std::time::Duration;

crate::define_id! {
    /// Unique identifier for an edge executor.
    ///
    /// Proplets self-identify on the control plane; the manager never mints
    /// these.
    pub struct PropletId;
}

/// Number of liveness timestamps retained per proplet.
pub const ALIVE_HISTORY_LEN: usize = 10;

/// A proplet is considered alive while its last liveness message is within
/// this window.
pub const DEFAULT_ALIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// An edge executor known to the manager.
///
/// `alive` is a cached view; readers recompute it from the history tail via
/// [`Proplet::refresh_alive`]. `task_count` tracks currently bound tasks and
/// never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proplet {
    pub id: PropletId,
    pub name: String,
    #[serde(default)]
    pub alive: bool,
    #[serde(default)]
    pub task_count: u64,
    /// Epoch-ms timestamps of the most recent liveness messages, oldest first.
    #[serde(default)]
    pub alive_history: Vec<u64>,
}

impl Proplet {
    pub fn new(id: PropletId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            alive: false,
            task_count: 0,
            alive_history: Vec::new(),
        }
    }

    /// Record a liveness message, keeping the history bounded.
    pub fn record_alive(&mut self, now_ms: u64) {
        self.alive = true;
        self.alive_history.push(now_ms);
        if self.alive_history.len() > ALIVE_HISTORY_LEN {
            let excess = self.alive_history.len() - ALIVE_HISTORY_LEN;
            self.alive_history.drain(..excess);
        }
    }

    /// Mark the proplet offline (LWT or explicit disconnect).
    pub fn mark_offline(&mut self) {
        self.alive = false;
    }

    /// Whether the tail liveness timestamp is within `timeout` of `now_ms`.
    pub fn alive_at(&self, now_ms: u64, timeout: Duration) -> bool {
        match self.alive_history.last() {
            Some(&last) => now_ms.saturating_sub(last) < timeout.as_millis() as u64,
            None => false,
        }
    }

    /// Recompute the cached `alive` flag from the history tail.
    pub fn refresh_alive(&mut self, now_ms: u64, timeout: Duration) {
        self.alive = self.alive && self.alive_at(now_ms, timeout);
    }

    pub fn increment_tasks(&mut self) {
        self.task_count += 1;
    }

    /// Decrement the bound-task count, clamped at zero.
    pub fn decrement_tasks(&mut self) {
        self.task_count = self.task_count.saturating_sub(1);
    }
}

#[cfg(test)]
#[path = "proplet_tests.rs"]
mod tests;
