// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Round deadline enforcement.
//!
//! A 5-second ticker scans open rounds; a round past its timeout is either
//! force-aggregated over whatever updates arrived, or failed outright when
//! nothing arrived. Handler errors are logged and the loop continues.

use crate::error::ServiceError;
use crate::rounds::RoundController;
use indexmap::IndexMap;
use propeller_core::{Clock, Task, TaskState};
use propeller_storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Period between deadline scans.
pub const SCAN_PERIOD: Duration = Duration::from_secs(5);

pub struct DeadlineScanner<C: Clock> {
    tasks: Arc<dyn Storage<Task>>,
    rounds: Arc<RoundController<C>>,
    clock: C,
}

impl<C: Clock> DeadlineScanner<C> {
    pub fn new(
        tasks: Arc<dyn Storage<Task>>,
        rounds: Arc<RoundController<C>>,
        clock: C,
    ) -> Self {
        Self {
            tasks,
            rounds,
            clock,
        }
    }

    /// Tick until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(SCAN_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("deadline scanner stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.scan().await {
                        tracing::warn!(error = %e, "deadline scan failed");
                    }
                }
            }
        }
    }

    /// One scan pass over every open round.
    pub async fn scan(&self) -> Result<(), ServiceError> {
        let (all, _) = self.tasks.list(0, 0).await?;
        let mut rounds: IndexMap<(String, u64), Vec<Task>> = IndexMap::new();
        for task in all {
            if !task.is_fl_train() {
                continue;
            }
            let Some(spec) = &task.fl else { continue };
            rounds
                .entry((spec.job_id.clone(), spec.round_id))
                .or_default()
                .push(task);
        }

        let now_ms = self.clock.epoch_ms();
        for ((job_id, round_id), tasks) in rounds {
            if let Err(e) = self.check_round(&job_id, round_id, &tasks, now_ms).await {
                tracing::warn!(job_id = %job_id, round_id, error = %e, "round deadline check failed");
            }
        }
        Ok(())
    }

    async fn check_round(
        &self,
        job_id: &str,
        round_id: u64,
        tasks: &[Task],
        now_ms: u64,
    ) -> Result<(), ServiceError> {
        let Some(spec) = tasks.iter().find_map(|t| t.fl.clone()) else {
            return Ok(());
        };
        if spec.round_timeout_s == 0 {
            return Ok(());
        }
        // Round start is the earliest dispatch among its tasks
        let Some(started_ms) = tasks.iter().filter_map(|t| t.started_at_ms).min() else {
            return Ok(());
        };
        if now_ms.saturating_sub(started_ms) < spec.round_timeout_s * 1_000 {
            return Ok(());
        }
        if self.rounds.is_aggregated(job_id, round_id).await {
            return Ok(());
        }

        let progress = self.rounds.round_progress(job_id, round_id).await?;
        if !progress.updates.is_empty() {
            tracing::info!(
                job_id,
                round_id,
                completed = progress.completed,
                expected = progress.expected,
                "round timed out; aggregating partial updates"
            );
            self.rounds
                .try_aggregate_and_advance(job_id, round_id, true)
                .await?;
            return Ok(());
        }

        // Zero updates at timeout: no aggregate, the round fails
        let mut failed = 0;
        for task in tasks {
            if task.state.is_terminal() {
                continue;
            }
            let mut task = task.clone();
            let reason = format!(
                "round {round_id} of job {job_id} timed out after {}s with no updates",
                spec.round_timeout_s
            );
            task.error = Some(reason);
            if task.advance_to(TaskState::Failed, now_ms).is_ok() {
                self.tasks.update(task.id.as_str(), task.clone()).await?;
                failed += 1;
            }
        }
        if failed > 0 {
            tracing::warn!(job_id, round_id, failed, "round timed out with zero updates");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "deadline_tests.rs"]
mod tests;
