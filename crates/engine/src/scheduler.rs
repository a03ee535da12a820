// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proplet selection strategies.

use propeller_core::{Proplet, Task};
use rand::seq::SliceRandom;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("no proplet available")]
    NoProplet,
    #[error("no alive proplet available")]
    AllDead,
}

/// Picks a proplet for a task.
///
/// Implementations see the full fleet and must skip dead proplets
/// themselves; the task is available for affinity-aware strategies.
pub trait Scheduler: Send + Sync {
    fn select(&self, task: &Task, proplets: &[Proplet]) -> Result<Proplet, SchedulerError>;
}

fn alive(proplets: &[Proplet]) -> Result<Vec<&Proplet>, SchedulerError> {
    if proplets.is_empty() {
        return Err(SchedulerError::NoProplet);
    }
    let alive: Vec<&Proplet> = proplets.iter().filter(|p| p.alive).collect();
    if alive.is_empty() {
        return Err(SchedulerError::AllDead);
    }
    Ok(alive)
}

/// Stateful cursor over the alive set; stable within one process lifetime.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for RoundRobin {
    fn select(&self, _task: &Task, proplets: &[Proplet]) -> Result<Proplet, SchedulerError> {
        let alive = alive(proplets)?;
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % alive.len();
        Ok(alive[idx].clone())
    }
}

/// Minimum `task_count` among alive proplets; ties break by slice order.
#[derive(Debug, Default)]
pub struct LeastLoaded;

impl Scheduler for LeastLoaded {
    fn select(&self, _task: &Task, proplets: &[Proplet]) -> Result<Proplet, SchedulerError> {
        let alive = alive(proplets)?;
        alive
            .into_iter()
            .min_by_key(|p| p.task_count)
            .cloned()
            .ok_or(SchedulerError::AllDead)
    }
}

/// Uniform pick over alive proplets.
#[derive(Debug, Default)]
pub struct Random;

impl Scheduler for Random {
    fn select(&self, _task: &Task, proplets: &[Proplet]) -> Result<Proplet, SchedulerError> {
        let alive = alive(proplets)?;
        alive
            .choose(&mut rand::thread_rng())
            .map(|p| (*p).clone())
            .ok_or(SchedulerError::AllDead)
    }
}

/// Configured selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerAlgorithm {
    #[default]
    RoundRobin,
    LeastLoaded,
    Random,
}

impl SchedulerAlgorithm {
    pub fn build(self) -> Arc<dyn Scheduler> {
        match self {
            SchedulerAlgorithm::RoundRobin => Arc::new(RoundRobin::new()),
            SchedulerAlgorithm::LeastLoaded => Arc::new(LeastLoaded),
            SchedulerAlgorithm::Random => Arc::new(Random),
        }
    }
}

impl FromStr for SchedulerAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "roundrobin" | "round-robin" | "round_robin" => Ok(SchedulerAlgorithm::RoundRobin),
            "leastloaded" | "least-loaded" | "least_loaded" => Ok(SchedulerAlgorithm::LeastLoaded),
            "random" => Ok(SchedulerAlgorithm::Random),
            other => Err(format!("unknown scheduler algorithm: {other}")),
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
