// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared reconciler context.

use kube::Client;
use parking_lot::Mutex;
use propeller_core::{Clock, SystemClock};
use propeller_engine::{Scheduler, SchedulerAlgorithm};
use std::collections::HashMap;
use std::sync::Arc;

/// State shared by all reconcilers.
///
/// Per-group schedulers are cached so a round-robin cursor stays stable for
/// the life of the process instead of resetting every reconcile.
pub struct Ctx {
    pub client: Client,
    clock: SystemClock,
    schedulers: Mutex<HashMap<String, Arc<dyn Scheduler>>>,
}

impl Ctx {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            clock: SystemClock,
            schedulers: Mutex::new(HashMap::new()),
        }
    }

    pub fn epoch_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Scheduler for a group, created on first use from its configured
    /// algorithm.
    pub fn scheduler_for(&self, group: &str, algorithm: Option<&str>) -> Arc<dyn Scheduler> {
        let mut schedulers = self.schedulers.lock();
        if let Some(existing) = schedulers.get(group) {
            return Arc::clone(existing);
        }
        let algorithm = algorithm
            .and_then(|s| s.parse::<SchedulerAlgorithm>().ok())
            .unwrap_or_default();
        let scheduler = algorithm.build();
        schedulers.insert(group.to_string(), Arc::clone(&scheduler));
        scheduler
    }
}
