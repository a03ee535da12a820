// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task service: CRUD, dispatch, and the task-to-proplet binding.

use crate::error::ServiceError;
use crate::registry::PropletRegistry;
use crate::scheduler::Scheduler;
use propeller_adapters::{CoordinatorClient, PubSub};
use propeller_core::fl::env_keys;
use propeller_core::{
    aggregate_key, Clock, IdGen, NewTask, Proplet, PropletId, StartFl, StartPayload, StopPayload,
    Task, TaskId, TaskState, TopicBuilder, UpdateEnvelope,
};
use propeller_storage::{Storage, StorageError};
use std::sync::Arc;

/// Mutable fields accepted by [`TaskService::update_task`].
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub inputs: Option<Vec<u64>>,
    pub file: Option<Vec<u8>>,
}

/// Orchestrates the task lifecycle over the storage and pub/sub ports.
///
/// All cross-task state lives in storage; the service itself holds no maps,
/// so handlers can run concurrently against one shared value.
pub struct TaskService<C: Clock> {
    tasks: Arc<dyn Storage<Task>>,
    bindings: Arc<dyn Storage<PropletId>>,
    aggregates: Arc<dyn Storage<UpdateEnvelope>>,
    registry: Arc<PropletRegistry<C>>,
    scheduler: Arc<dyn Scheduler>,
    pubsub: Arc<dyn PubSub>,
    topics: TopicBuilder,
    idgen: Arc<dyn IdGen>,
    clock: C,
    coordinator: Option<CoordinatorClient>,
}

impl<C: Clock> TaskService<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tasks: Arc<dyn Storage<Task>>,
        bindings: Arc<dyn Storage<PropletId>>,
        aggregates: Arc<dyn Storage<UpdateEnvelope>>,
        registry: Arc<PropletRegistry<C>>,
        scheduler: Arc<dyn Scheduler>,
        pubsub: Arc<dyn PubSub>,
        topics: TopicBuilder,
        idgen: Arc<dyn IdGen>,
        clock: C,
        coordinator: Option<CoordinatorClient>,
    ) -> Self {
        Self {
            tasks,
            bindings,
            aggregates,
            registry,
            scheduler,
            pubsub,
            topics,
            idgen,
            clock,
            coordinator,
        }
    }

    /// Create a task without dispatching it.
    pub async fn create_task(&self, new: NewTask) -> Result<Task, ServiceError> {
        if new.name.trim().is_empty() {
            return Err(ServiceError::InvalidInput("task name is required".into()));
        }
        if let Some(fl) = &new.fl {
            if fl.job_id.is_empty() {
                return Err(ServiceError::InvalidInput(
                    "federated task requires fl.job_id".into(),
                ));
            }
        }
        let id = TaskId::new(self.idgen.next());
        let task = Task::new(new, id.clone(), self.clock.epoch_ms());
        self.tasks.create(id.as_str(), task.clone()).await?;
        tracing::info!(task_id = %id, name = %task.name, kind = ?task.kind, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        self.tasks
            .get(id.as_str())
            .await
            .map_err(|_| ServiceError::TaskNotFound(id.to_string()))
    }

    pub async fn list_tasks(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Task>, usize), ServiceError> {
        Ok(self.tasks.list(offset, limit).await?)
    }

    /// Update mutable fields only (name, inputs, file).
    pub async fn update_task(&self, id: &TaskId, update: TaskUpdate) -> Result<Task, ServiceError> {
        let mut task = self.get_task(id).await?;
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(ServiceError::InvalidInput("task name is required".into()));
            }
            task.name = name;
        }
        if let Some(inputs) = update.inputs {
            task.inputs = inputs;
        }
        if let Some(file) = update.file {
            task.file = Some(file);
        }
        task.updated_at_ms = self.clock.epoch_ms();
        self.tasks.update(id.as_str(), task.clone()).await?;
        Ok(task)
    }

    pub async fn delete_task(&self, id: &TaskId) -> Result<(), ServiceError> {
        let task = self.get_task(id).await?;
        if task.state == TaskState::Running {
            return Err(ServiceError::InvalidState(format!(
                "task {id} is running; stop it first"
            )));
        }
        self.tasks.delete(id.as_str()).await?;
        let _ = self.bindings.delete(id.as_str()).await;
        Ok(())
    }

    /// Dispatch a task: select a proplet, bind, publish START, go Running.
    ///
    /// A publish failure after a fresh bind rolls the binding back so the
    /// task can be restarted cleanly.
    pub async fn start_task(&self, id: &TaskId) -> Result<Task, ServiceError> {
        let mut task = self.get_task(id).await?;
        if task.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "task {id} is {}; cannot start",
                task.state
            )));
        }

        let proplet = self.resolve_proplet(&task).await?;
        let newly_bound = self.bind(&task.id, &proplet.id).await?;

        if task.fl.is_some() {
            self.inject_fl_env(&mut task).await;
        }

        let now_ms = self.clock.epoch_ms();
        task.proplet_id = Some(proplet.id.clone());
        if task.state == TaskState::Pending {
            task.transition(TaskState::Scheduled, now_ms)
                .map_err(|e| ServiceError::InvalidState(e.to_string()))?;
        }
        task.updated_at_ms = now_ms;
        self.tasks.update(id.as_str(), task.clone()).await?;

        let payload = serde_json::to_value(StartPayload::from_task(&task, proplet.id.clone()))?;
        if let Err(e) = self.pubsub.publish(&self.topics.manager_start(), &payload).await {
            if newly_bound {
                let _ = self.bindings.delete(id.as_str()).await;
            }
            tracing::warn!(task_id = %id, error = %e, "START publish failed; binding rolled back");
            return Err(e.into());
        }

        if newly_bound {
            self.registry.increment_task_count(&proplet.id).await?;
        }

        task.advance_to(TaskState::Running, self.clock.epoch_ms())
            .map_err(|e| ServiceError::InvalidState(e.to_string()))?;
        self.tasks.update(id.as_str(), task.clone()).await?;
        tracing::info!(task_id = %id, proplet_id = %proplet.id, "task started");

        self.forward_experiment(&task).await;
        Ok(task)
    }

    /// Publish STOP and release the binding. Task state is left alone; the
    /// proplet is expected to report a result or fail.
    pub async fn stop_task(&self, id: &TaskId) -> Result<(), ServiceError> {
        let task = self.get_task(id).await?;
        let proplet_id = self.bindings.get(id.as_str()).await.map_err(|_| {
            ServiceError::InvalidState(format!("task {id} is not bound to a proplet"))
        })?;

        let payload = serde_json::to_value(StopPayload {
            id: task.id.clone(),
            proplet_id: proplet_id.clone(),
        })?;
        self.pubsub
            .publish(&self.topics.manager_stop(), &payload)
            .await?;

        let _ = self.bindings.delete(id.as_str()).await;
        self.registry.decrement_task_count(&proplet_id).await;
        tracing::info!(task_id = %id, proplet_id = %proplet_id, "task stopped");
        Ok(())
    }

    /// Current binding for a task, if any.
    pub async fn binding(&self, id: &TaskId) -> Option<PropletId> {
        self.bindings.get(id.as_str()).await.ok()
    }

    pub fn registry(&self) -> &Arc<PropletRegistry<C>> {
        &self.registry
    }

    async fn resolve_proplet(&self, task: &Task) -> Result<Proplet, ServiceError> {
        if let Some(pinned) = &task.proplet_id {
            let proplet = self.registry.get_proplet(pinned).await?;
            if !proplet.alive {
                return Err(ServiceError::PropletDead(pinned.to_string()));
            }
            return Ok(proplet);
        }
        let (proplets, _) = self.registry.list_proplets(0, 0).await?;
        Ok(self.scheduler.select(task, &proplets)?)
    }

    /// Bind task to proplet. Returns true on a fresh bind; re-binding the
    /// same pair is a no-op, any other pair is a conflict.
    async fn bind(&self, task_id: &TaskId, proplet_id: &PropletId) -> Result<bool, ServiceError> {
        match self
            .bindings
            .create(task_id.as_str(), proplet_id.clone())
            .await
        {
            Ok(()) => Ok(true),
            Err(StorageError::AlreadyExists(_)) => {
                let existing = self.bindings.get(task_id.as_str()).await?;
                if existing == *proplet_id {
                    Ok(false)
                } else {
                    Err(ServiceError::BindConflict {
                        task_id: task_id.to_string(),
                        bound: existing.to_string(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Inject the FL environment for a federated task at start time.
    async fn inject_fl_env(&self, task: &mut Task) {
        let Some(spec) = task.fl.clone() else {
            return;
        };
        let env = &mut task.env;
        env.insert(env_keys::JOB_ID.to_string(), spec.job_id.clone());
        env.insert(env_keys::ROUND_ID.to_string(), spec.round_id.to_string());

        let mut global_version = spec.global_version.clone();
        if spec.round_id > 0 {
            let key = aggregate_key(&spec.job_id, spec.round_id - 1);
            if let Ok(aggregate) = self.aggregates.get(&key).await {
                env.insert(
                    env_keys::GLOBAL_UPDATE_B64.to_string(),
                    aggregate.update_b64.clone(),
                );
                env.insert(
                    env_keys::GLOBAL_UPDATE_FORMAT.to_string(),
                    aggregate.format.as_str().to_string(),
                );
                global_version = aggregate.global_version;
            }
        }
        env.insert(env_keys::GLOBAL_VERSION.to_string(), global_version);

        if !spec.update_format.is_empty() {
            env.insert(
                env_keys::FORMAT.to_string(),
                spec.update_format.as_str().to_string(),
            );
        }
        if let Some(model_ref) = &spec.model_ref {
            env.insert(env_keys::MODEL_REF.to_string(), model_ref.clone());
        }
        if !env.contains_key(env_keys::NUM_SAMPLES) {
            tracing::warn!(
                task_id = %task.id,
                "FL_NUM_SAMPLES not set; defaulting to \"1\""
            );
            env.insert(env_keys::NUM_SAMPLES.to_string(), "1".to_string());
        }
    }

    /// Forward the experiment configuration to an external coordinator, when
    /// one is configured. Best-effort: failures are logged, never fatal.
    async fn forward_experiment(&self, task: &Task) {
        let (Some(coordinator), Some(spec)) = (&self.coordinator, &task.fl) else {
            return;
        };
        let experiment = serde_json::json!({
            "task_id": task.id,
            "fl": StartFl::from(spec),
        });
        if let Err(e) = coordinator.forward_experiment(&experiment).await {
            tracing::warn!(
                task_id = %task.id,
                coordinator = coordinator.base_url(),
                error = %e,
                "experiment forwarding failed"
            );
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
