// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Federated round controller.
//!
//! Tracks k-of-n completion per `(job_id, round_id)`, runs the single-shot
//! aggregation, and launches the next round seeded with the aggregate. The
//! latch guarantees at most one aggregation publish per round per manager
//! instance; a failed advance releases it so a later trigger can retry.

use crate::aggregate::aggregate;
use crate::error::ServiceError;
use crate::service::TaskService;
use propeller_core::fl::env_keys;
use propeller_core::{
    aggregate_key, AggregatedPayload, Clock, FlSpec, IdGen, NewTask, PropletId, Task, TaskKind,
    TaskMode, TaskState, TopicBuilder, UpdateEnvelope, UpdateFormat,
};
use propeller_adapters::PubSub;
use propeller_storage::{Storage, StorageError};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Completion picture of one round.
#[derive(Debug, Clone)]
pub struct RoundProgress {
    /// Distinct proplets expected to report (bound or pinned).
    pub expected: usize,
    /// Distinct proplets whose matching envelope has been committed.
    pub completed: usize,
    /// Latest envelope per proplet, in first-seen order.
    pub updates: Vec<UpdateEnvelope>,
    /// First non-empty format observed among the updates.
    pub format: Option<UpdateFormat>,
    pub total_samples: u64,
}

/// Drives rounds to aggregation and hands the baton to the next one.
pub struct RoundController<C: Clock> {
    service: Arc<TaskService<C>>,
    tasks: Arc<dyn Storage<Task>>,
    bindings: Arc<dyn Storage<PropletId>>,
    aggregates: Arc<dyn Storage<UpdateEnvelope>>,
    pubsub: Arc<dyn PubSub>,
    topics: TopicBuilder,
    idgen: Arc<dyn IdGen>,
    clock: C,
    /// Single-shot latch per (job_id, round_id).
    aggregated: Mutex<HashSet<(String, u64)>>,
}

impl<C: Clock> RoundController<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service: Arc<TaskService<C>>,
        tasks: Arc<dyn Storage<Task>>,
        bindings: Arc<dyn Storage<PropletId>>,
        aggregates: Arc<dyn Storage<UpdateEnvelope>>,
        pubsub: Arc<dyn PubSub>,
        topics: TopicBuilder,
        idgen: Arc<dyn IdGen>,
        clock: C,
    ) -> Self {
        Self {
            service,
            tasks,
            bindings,
            aggregates,
            pubsub,
            topics,
            idgen,
            clock,
            aggregated: Mutex::new(HashSet::new()),
        }
    }

    /// All training tasks of one round.
    pub async fn round_tasks(&self, job_id: &str, round_id: u64) -> Result<Vec<Task>, ServiceError> {
        let (all, _) = self.tasks.list(0, 0).await?;
        Ok(all
            .into_iter()
            .filter(|t| {
                t.is_fl_train()
                    && t.fl
                        .as_ref()
                        .is_some_and(|spec| spec.matches(job_id, round_id))
            })
            .collect())
    }

    /// Compute the completion picture for a round.
    pub async fn round_progress(
        &self,
        job_id: &str,
        round_id: u64,
    ) -> Result<RoundProgress, ServiceError> {
        let tasks = self.round_tasks(job_id, round_id).await?;

        let mut expected: HashSet<String> = HashSet::new();
        for task in &tasks {
            if let Some(proplet) = &task.proplet_id {
                expected.insert(proplet.to_string());
            } else if let Ok(bound) = self.bindings.get(task.id.as_str()).await {
                expected.insert(bound.to_string());
            }
        }

        let mut updates: IndexMap<String, UpdateEnvelope> = IndexMap::new();
        for task in &tasks {
            if task.state != TaskState::Completed {
                continue;
            }
            let Some(envelope) = task.results.as_ref().and_then(|r| r.as_update()) else {
                continue;
            };
            if envelope.job_id == job_id
                && envelope.round_id == round_id
                && !envelope.proplet_id.is_empty()
            {
                // later envelope supersedes an earlier one for the same proplet
                updates.insert(envelope.proplet_id.clone(), envelope.clone());
            }
        }

        let format = updates.values().map(|u| &u.format).find(|f| !f.is_empty()).cloned();
        let total_samples = updates.values().map(|u| u.num_samples).sum();
        Ok(RoundProgress {
            expected: expected.len(),
            completed: updates.len(),
            updates: updates.into_values().collect(),
            format,
            total_samples,
        })
    }

    /// Whether a round already has a persisted aggregate.
    pub async fn is_aggregated(&self, job_id: &str, round_id: u64) -> bool {
        self.aggregates
            .get(&aggregate_key(job_id, round_id))
            .await
            .is_ok()
    }

    /// Aggregate and advance once the round is complete.
    ///
    /// With `force` set (deadline path) the k-of-n gate is skipped and
    /// whatever updates arrived are used. Returns true when this call
    /// performed the aggregation.
    pub async fn try_aggregate_and_advance(
        &self,
        job_id: &str,
        round_id: u64,
        force: bool,
    ) -> Result<bool, ServiceError> {
        let progress = self.round_progress(job_id, round_id).await?;
        if !force && (progress.expected == 0 || progress.completed < progress.expected) {
            return Ok(false);
        }
        if progress.updates.is_empty() {
            return Ok(false);
        }

        {
            let mut latch = self.aggregated.lock();
            if !latch.insert((job_id.to_string(), round_id)) {
                return Ok(false);
            }
        }

        match self.aggregate_and_advance(job_id, round_id, &progress).await {
            Ok(()) => Ok(true),
            Err(e) => {
                self.aggregated
                    .lock()
                    .remove(&(job_id.to_string(), round_id));
                Err(e)
            }
        }
    }

    async fn aggregate_and_advance(
        &self,
        job_id: &str,
        round_id: u64,
        progress: &RoundProgress,
    ) -> Result<(), ServiceError> {
        let tasks = self.round_tasks(job_id, round_id).await?;
        let Some(spec) = tasks.iter().find_map(|t| t.fl.clone()) else {
            return Ok(());
        };
        let format = progress
            .format
            .clone()
            .unwrap_or_else(|| spec.update_format.clone());

        let record = aggregate(
            &progress.updates,
            &spec.algorithm,
            &format,
            self.idgen.next(),
            "manager",
            self.clock.epoch_ms(),
        )?;

        match self
            .aggregates
            .create(&aggregate_key(job_id, round_id), record.clone())
            .await
        {
            Ok(()) => {}
            // Another instance beat us to it; our publish is still the only
            // one from this manager
            Err(StorageError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let payload = AggregatedPayload {
            job_id: job_id.to_string(),
            round_id,
            global_version: record.global_version.clone(),
            update_b64: record.update_b64.clone(),
            format: record.format.clone(),
            metrics: record.metrics.clone(),
            num_samples: record.num_samples,
            aggregated_from: progress
                .updates
                .iter()
                .map(|u| u.proplet_id.clone())
                .collect(),
        };
        self.pubsub
            .publish(&self.topics.fl_aggregated(), &serde_json::to_value(payload)?)
            .await?;
        tracing::info!(
            job_id,
            round_id,
            num_samples = record.num_samples,
            clients = progress.updates.len(),
            "round aggregated"
        );

        self.start_next_round(job_id, round_id, &record).await
    }

    /// Instantiate and dispatch round `round_id + 1`, cloning the current
    /// round's tasks with the aggregate as seed. Idempotent: an existing
    /// next-round task means another trigger already won.
    pub async fn start_next_round(
        &self,
        job_id: &str,
        round_id: u64,
        record: &UpdateEnvelope,
    ) -> Result<(), ServiceError> {
        let current = self.round_tasks(job_id, round_id).await?;
        let Some(spec) = current.iter().find_map(|t| t.fl.clone()) else {
            return Ok(());
        };

        let next_round = round_id + 1;
        if spec.total_rounds > 0 && next_round > spec.total_rounds {
            tracing::info!(job_id, total_rounds = spec.total_rounds, "job completed all rounds");
            return Ok(());
        }
        if !self.round_tasks(job_id, next_round).await?.is_empty() {
            return Ok(());
        }

        for task in &current {
            let pinned = match self.bindings.get(task.id.as_str()).await {
                Ok(bound) => Some(bound),
                Err(_) => task.proplet_id.clone(),
            };

            let mut env = task.env.clone();
            env.insert(env_keys::JOB_ID.to_string(), job_id.to_string());
            env.insert(env_keys::ROUND_ID.to_string(), next_round.to_string());
            env.insert(
                env_keys::GLOBAL_VERSION.to_string(),
                record.global_version.clone(),
            );
            env.insert(
                env_keys::GLOBAL_UPDATE_B64.to_string(),
                record.update_b64.clone(),
            );
            env.insert(
                env_keys::GLOBAL_UPDATE_FORMAT.to_string(),
                record.format.as_str().to_string(),
            );
            let format = if spec.update_format.is_empty() {
                record.format.clone()
            } else {
                spec.update_format.clone()
            };
            env.insert(env_keys::FORMAT.to_string(), format.as_str().to_string());
            if !env.contains_key(env_keys::NUM_SAMPLES) {
                env.insert(env_keys::NUM_SAMPLES.to_string(), "1".to_string());
            }

            let next_spec = FlSpec {
                job_id: job_id.to_string(),
                round_id: next_round,
                global_version: record.global_version.clone(),
                min_participants: spec.min_participants,
                round_timeout_s: spec.round_timeout_s,
                clients_per_round: spec.clients_per_round,
                total_rounds: spec.total_rounds,
                algorithm: spec.algorithm.clone(),
                update_format: spec.update_format.clone(),
                model_ref: spec.model_ref.clone(),
                hyperparameters: spec.hyperparameters.clone(),
            };

            let new = NewTask {
                name: task.name.clone(),
                image_url: task.image_url.clone(),
                file: task.file.clone(),
                cli_args: task.cli_args.clone(),
                inputs: task.inputs.clone(),
                env,
                daemon: task.daemon,
                restart_policy: task.restart_policy.clone(),
                monitoring_profile: task.monitoring_profile.clone(),
                kind: Some(TaskKind::Federated),
                mode: Some(TaskMode::Train),
                fl: Some(next_spec),
                proplet_id: pinned,
            };

            let created = self.service.create_task(new).await?;
            self.service.start_task(&created.id).await?;
        }
        tracing::info!(job_id, round_id = next_round, participants = current.len(), "next round started");
        Ok(())
    }
}

#[cfg(test)]
#[path = "rounds_tests.rs"]
mod tests;
