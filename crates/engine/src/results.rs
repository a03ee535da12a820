// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result ingestion: parse, validate, and commit proplet-reported results.

use crate::error::ServiceError;
use crate::rounds::RoundController;
use propeller_core::{
    Clock, PropletId, ResultsMessage, Task, TaskResults, TaskState, UpdateEnvelope,
};
use propeller_storage::Storage;
use std::sync::Arc;

/// Subscriber-side handler for `.../control/proplet/results`.
///
/// Reentrant and idempotent: duplicate delivery of the same result is a
/// no-op once the task is terminal.
pub struct ResultIngestion<C: Clock> {
    tasks: Arc<dyn Storage<Task>>,
    bindings: Arc<dyn Storage<PropletId>>,
    rounds: Arc<RoundController<C>>,
    clock: C,
}

impl<C: Clock> ResultIngestion<C> {
    pub fn new(
        tasks: Arc<dyn Storage<Task>>,
        bindings: Arc<dyn Storage<PropletId>>,
        rounds: Arc<RoundController<C>>,
        clock: C,
    ) -> Self {
        Self {
            tasks,
            bindings,
            rounds,
            clock,
        }
    }

    /// Process one result message.
    ///
    /// Unknown task ids are dropped silently (duplicate or orphan traffic).
    pub async fn handle(&self, msg: ResultsMessage) -> Result<(), ServiceError> {
        let mut task = match self.tasks.get(msg.task_id.as_str()).await {
            Ok(task) => task,
            Err(_) => {
                tracing::debug!(task_id = %msg.task_id, "result for unknown task dropped");
                return Ok(());
            }
        };
        if task.is_terminal() {
            tracing::debug!(task_id = %msg.task_id, "result for terminal task dropped");
            return Ok(());
        }

        if task.is_fl_train() {
            self.handle_fl(&mut task, msg).await
        } else {
            self.handle_standard(&mut task, msg).await
        }
    }

    /// Standard tasks: store the payload verbatim and complete.
    async fn handle_standard(
        &self,
        task: &mut Task,
        msg: ResultsMessage,
    ) -> Result<(), ServiceError> {
        task.results = Some(TaskResults::Value(msg.results));
        task.error = msg.error;
        task.advance_to(TaskState::Completed, self.clock.epoch_ms())
            .map_err(|e| ServiceError::InvalidState(e.to_string()))?;
        self.tasks.update(task.id.as_str(), task.clone()).await?;
        tracing::info!(task_id = %task.id, "task completed");
        Ok(())
    }

    /// FL training tasks: decode, validate provenance, commit, then poke the
    /// round controller. An aggregation failure never fails the commit.
    async fn handle_fl(&self, task: &mut Task, msg: ResultsMessage) -> Result<(), ServiceError> {
        let envelope = match UpdateEnvelope::from_results_value(&msg.results) {
            Ok(envelope) => envelope,
            Err(e) => {
                let reason = format!("malformed update envelope: {e}");
                self.fail_task(task, &reason).await?;
                return Err(ServiceError::InvalidInput(reason));
            }
        };

        if let Err(reason) = self.validate_envelope(task, &envelope).await {
            self.fail_task(task, &reason).await?;
            return Err(ServiceError::ResultSpoof {
                task_id: task.id.to_string(),
                reason,
            });
        }

        let job_id = envelope.job_id.clone();
        let round_id = envelope.round_id;
        task.results = Some(TaskResults::Update(envelope));
        task.error = msg.error;
        task.advance_to(TaskState::Completed, self.clock.epoch_ms())
            .map_err(|e| ServiceError::InvalidState(e.to_string()))?;
        self.tasks.update(task.id.as_str(), task.clone()).await?;
        tracing::info!(task_id = %task.id, job_id, round_id, "training update committed");

        if let Err(e) = self
            .rounds
            .try_aggregate_and_advance(&job_id, round_id, false)
            .await
        {
            tracing::warn!(job_id, round_id, error = %e, "aggregation attempt failed");
        }
        Ok(())
    }

    /// Anti-spoof checks: `(job, round)` must match the task's spec and
    /// `proplet_id` must match the binding.
    async fn validate_envelope(&self, task: &Task, envelope: &UpdateEnvelope) -> Result<(), String> {
        let Some(spec) = &task.fl else {
            return Err("task has no FL spec".to_string());
        };
        if envelope.job_id.is_empty() {
            return Err("envelope job_id is empty".to_string());
        }
        if !spec.matches(&envelope.job_id, envelope.round_id) {
            return Err(format!(
                "envelope ({}, {}) does not match task round ({}, {})",
                envelope.job_id, envelope.round_id, spec.job_id, spec.round_id
            ));
        }

        let expected = match self.bindings.get(task.id.as_str()).await {
            Ok(bound) => bound,
            Err(_) => match &task.proplet_id {
                Some(pinned) => pinned.clone(),
                None => return Err("task has no bound proplet".to_string()),
            },
        };
        if envelope.proplet_id.is_empty() {
            return Err("envelope proplet_id is empty".to_string());
        }
        if expected != envelope.proplet_id.as_str() {
            return Err(format!(
                "envelope proplet {} does not match bound proplet {}",
                envelope.proplet_id, expected
            ));
        }
        Ok(())
    }

    async fn fail_task(&self, task: &mut Task, reason: &str) -> Result<(), ServiceError> {
        tracing::warn!(task_id = %task.id, reason, "rejecting training update");
        task.error = Some(reason.to_string());
        task.advance_to(TaskState::Failed, self.clock.epoch_ms())
            .map_err(|e| ServiceError::InvalidState(e.to_string()))?;
        self.tasks.update(task.id.as_str(), task.clone()).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "results_tests.rs"]
mod tests;
