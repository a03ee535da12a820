// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WasmTask reconciler.
//!
//! Drives `"" -> Pending -> Running -> {Completed, Failed}`: resolve a
//! proplet, materialize an env ConfigMap plus a Kubernetes Job, then watch
//! the Job and extract the result on success.

use crate::context::Ctx;
use crate::crd::{
    GroupProplet, PropletGroup, TaskPhase, WasmTask, WasmTaskStatus,
};
use crate::error::{Error, Result};
use crate::extract::extract_job_result;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapEnvSource, Container, EnvFromSource, EnvVar, PodSpec, PodTemplateSpec,
};
use kube::api::{ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use propeller_core::{NewTask, PropletId, Task};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Fallback placement when neither a pin nor a group is given.
pub const DEFAULT_PROPLET: &str = "default";

/// A resolved placement: proplet id plus its backing node, when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub proplet_id: String,
    pub node: Option<String>,
}

/// Pick the proplet for a task: explicit pin, else group selection via the
/// group's scheduler algorithm, else the default proplet.
pub async fn resolve_placement(task: &WasmTask, ctx: &Ctx, namespace: &str) -> Result<Placement> {
    if let Some(pinned) = &task.spec.proplet_id {
        return Ok(Placement {
            proplet_id: pinned.clone(),
            node: None,
        });
    }
    if let Some(group_ref) = &task.spec.group_ref {
        let groups: Api<PropletGroup> = Api::namespaced(ctx.client.clone(), namespace);
        let group = groups
            .get_opt(group_ref)
            .await?
            .ok_or_else(|| Error::InvalidSpec(format!("unknown proplet group: {group_ref}")))?;
        let members = group
            .status
            .as_ref()
            .map(|s| s.proplets.clone())
            .unwrap_or_default();
        return select_from_group(task, ctx, group_ref, group.spec.algorithm.as_deref(), &members);
    }
    Ok(Placement {
        proplet_id: DEFAULT_PROPLET.to_string(),
        node: None,
    })
}

/// Run the configured scheduler over a group's materialized members.
pub fn select_from_group(
    task: &WasmTask,
    ctx: &Ctx,
    group_ref: &str,
    algorithm: Option<&str>,
    members: &[GroupProplet],
) -> Result<Placement> {
    let fleet: Vec<propeller_core::Proplet> = members
        .iter()
        .map(|member| {
            let mut proplet =
                propeller_core::Proplet::new(PropletId::new(member.id.clone()), member.id.clone());
            proplet.alive = member.alive;
            proplet.task_count = member.task_count;
            proplet
        })
        .collect();
    // Scheduler contract wants a core task; only identity matters here
    let core_task = Task::new(
        NewTask {
            name: task.name_any(),
            ..NewTask::default()
        },
        propeller_core::TaskId::new(task.name_any()),
        0,
    );
    let scheduler = ctx.scheduler_for(group_ref, algorithm);
    let chosen = scheduler
        .select(&core_task, &fleet)
        .map_err(|e| Error::InvalidSpec(format!("group {group_ref}: {e}")))?;
    let node = members
        .iter()
        .find(|m| m.id == chosen.id.as_str())
        .and_then(|m| m.node.clone());
    Ok(Placement {
        proplet_id: chosen.id.to_string(),
        node,
    })
}

/// ConfigMap `{task}-env` holding the task environment.
pub fn build_config_map(task: &WasmTask) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(format!("{}-env", task.name_any())),
            namespace: task.namespace(),
            owner_references: task.controller_owner_ref(&()).map(|oref| vec![oref]),
            ..ObjectMeta::default()
        },
        data: Some(task.spec.env.clone()),
        ..ConfigMap::default()
    }
}

/// The Kubernetes Job running the wasm workload on the chosen proplet.
pub fn build_job(task: &WasmTask, placement: &Placement) -> Job {
    let name = task.name_any();
    let restart_policy = if task.spec.daemon {
        "Always"
    } else {
        "OnFailure"
    };
    let node_selector: Option<BTreeMap<String, String>> = placement.node.as_ref().map(|node| {
        [("kubernetes.io/hostname".to_string(), node.clone())]
            .into_iter()
            .collect()
    });

    Job {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: task.namespace(),
            owner_references: task.controller_owner_ref(&()).map(|oref| vec![oref]),
            ..ObjectMeta::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(2),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    restart_policy: Some(restart_policy.to_string()),
                    node_selector,
                    containers: vec![Container {
                        name: "wasm".to_string(),
                        image: Some(task.spec.image.clone()),
                        env_from: Some(vec![EnvFromSource {
                            config_map_ref: Some(ConfigMapEnvSource {
                                name: format!("{name}-env"),
                                optional: Some(false),
                            }),
                            ..EnvFromSource::default()
                        }]),
                        env: Some(vec![
                            EnvVar {
                                name: "PROPLET_ID".to_string(),
                                value: Some(placement.proplet_id.clone()),
                                ..EnvVar::default()
                            },
                            EnvVar {
                                name: "TASK_ID".to_string(),
                                value: Some(name.clone()),
                                ..EnvVar::default()
                            },
                        ]),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..JobSpec::default()
        }),
        ..Job::default()
    }
}

/// First `Failed` condition message of a failed Job.
pub fn job_failure_message(job: &Job) -> Option<String> {
    job.status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == "Failed")
        .and_then(|c| c.message.clone())
}

async fn patch_status(api: &Api<WasmTask>, name: &str, status: &WasmTaskStatus) -> Result<()> {
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

async fn ensure<K>(api: &Api<K>, obj: &K) -> Result<()>
where
    K: Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn reconcile(task: Arc<WasmTask>, ctx: Arc<Ctx>) -> Result<Action> {
    let namespace = task
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = task.name_any();
    let tasks: Api<WasmTask> = Api::namespaced(ctx.client.clone(), &namespace);
    let jobs: Api<Job> = Api::namespaced(ctx.client.clone(), &namespace);
    let config_maps: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), &namespace);

    let status = task.status.clone().unwrap_or_default();
    match status.phase {
        None => {
            patch_status(
                &tasks,
                &name,
                &WasmTaskStatus {
                    phase: Some(TaskPhase::Pending),
                    ..status
                },
            )
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }

        Some(TaskPhase::Pending) => {
            let placement = resolve_placement(&task, &ctx, &namespace).await?;
            ensure(&config_maps, &build_config_map(&task)).await?;
            ensure(&jobs, &build_job(&task, &placement)).await?;
            patch_status(
                &tasks,
                &name,
                &WasmTaskStatus {
                    phase: Some(TaskPhase::Running),
                    proplet_id: Some(placement.proplet_id.clone()),
                    node: placement.node.clone(),
                    job_name: Some(name.clone()),
                    ..status
                },
            )
            .await?;
            tracing::info!(task = %name, proplet = %placement.proplet_id, "wasm task dispatched");
            Ok(Action::requeue(Duration::from_secs(5)))
        }

        Some(TaskPhase::Running) => {
            let job_name = status.job_name.clone().unwrap_or_else(|| name.clone());
            let Some(job) = jobs.get_opt(&job_name).await? else {
                return Ok(Action::requeue(Duration::from_secs(10)));
            };
            let job_status = job.status.clone().unwrap_or_default();

            if job_status.succeeded.unwrap_or(0) > 0 {
                let results = match extract_job_result(&ctx.client, &namespace, &job).await {
                    Ok(value) => Some(value),
                    Err(Error::NoResult(_)) => None,
                    Err(e) => return Err(e),
                };
                patch_status(
                    &tasks,
                    &name,
                    &WasmTaskStatus {
                        phase: Some(TaskPhase::Completed),
                        results,
                        ..status
                    },
                )
                .await?;
                tracing::info!(task = %name, "wasm task completed");
                return Ok(Action::await_change());
            }
            if job_status.failed.unwrap_or(0) > 0 {
                let message = job_failure_message(&job)
                    .unwrap_or_else(|| "job failed without a condition message".to_string());
                patch_status(
                    &tasks,
                    &name,
                    &WasmTaskStatus {
                        phase: Some(TaskPhase::Failed),
                        message: Some(message),
                        ..status
                    },
                )
                .await?;
                return Ok(Action::await_change());
            }
            Ok(Action::requeue(Duration::from_secs(10)))
        }

        Some(TaskPhase::Completed) | Some(TaskPhase::Failed) => Ok(Action::await_change()),
    }
}

pub fn error_policy(task: Arc<WasmTask>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    tracing::warn!(task = %task.name_any(), %error, "wasm task reconcile failed; requeueing");
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
#[path = "wasmtask_tests.rs"]
mod tests;
