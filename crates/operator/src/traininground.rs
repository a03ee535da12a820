// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TrainingRound reconciler.
//!
//! Drives `"" -> Pending -> Running -> Aggregating -> {Completed, Failed}`:
//! ensure one WasmTask per participant, collect extracted envelopes until
//! k-of-n or the deadline, then aggregate and annotate the result on self.

use crate::context::Ctx;
use crate::crd::{
    FederatedJob, RoundPhase, TaskPhase, TrainingRound, TrainingRoundStatus, WasmTask,
    WasmTaskSpec, AGGREGATED_UPDATE_ANNOTATION, COLLECTED_UPDATES_ANNOTATION,
};
use crate::error::{Error, Result};
use crate::extract::extract_fl_update;
use kube::api::{ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use propeller_core::{UpdateEnvelope, UpdateFormat};
use propeller_engine::aggregate;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Make a participant id usable inside a Kubernetes object name.
pub fn sanitize_name(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    out.truncate(63);
    out.trim_matches('-').to_string()
}

/// Name of a participant's WasmTask child.
pub fn task_name(round_name: &str, participant: &str) -> String {
    format!("{round_name}-{}", sanitize_name(participant))
}

/// Environment for a participant's task, seeding from the previous round's
/// aggregated update when one rode in on the round's annotation.
pub fn participant_env(
    round: &TrainingRound,
    participant: &str,
    seed: Option<&UpdateEnvelope>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("ROUND_ID".to_string(), round.spec.round_id.to_string());
    env.insert("MODEL_URI".to_string(), round.spec.model_ref.clone());
    env.insert("PROPLET_ID".to_string(), participant.to_string());
    env.insert("FL_JOB_ID".to_string(), round.spec.job_ref.clone());
    if let Some(seed) = seed {
        env.insert(
            "FL_GLOBAL_VERSION".to_string(),
            seed.global_version.clone(),
        );
        env.insert("FL_GLOBAL_UPDATE_B64".to_string(), seed.update_b64.clone());
        env.insert(
            "FL_GLOBAL_UPDATE_FORMAT".to_string(),
            seed.format.as_str().to_string(),
        );
    }
    if let Some(hyperparameters) = &round.spec.hyperparameters {
        if let Ok(encoded) = serde_json::to_string(hyperparameters) {
            env.insert("HYPERPARAMS".to_string(), encoded);
        }
    }
    env
}

/// The seed envelope carried in from the previous round, if any.
pub fn seed_update(round: &TrainingRound) -> Option<UpdateEnvelope> {
    round
        .annotations()
        .get(AGGREGATED_UPDATE_ANNOTATION)
        .and_then(|raw| serde_json::from_str(raw).ok())
}

fn build_task(round: &TrainingRound, participant: &str, seed: Option<&UpdateEnvelope>) -> WasmTask {
    let name = task_name(&round.name_any(), participant);
    let mut task = WasmTask::new(
        &name,
        WasmTaskSpec {
            image: round.spec.wasm_image.clone(),
            proplet_id: Some(participant.to_string()),
            group_ref: None,
            env: participant_env(round, participant, seed),
            mode: Some("train".to_string()),
            resources: None,
            daemon: false,
        },
    );
    task.metadata = ObjectMeta {
        name: Some(name),
        namespace: round.namespace(),
        owner_references: round.controller_owner_ref(&()).map(|oref| vec![oref]),
        ..ObjectMeta::default()
    };
    task
}

async fn patch_status(
    api: &Api<TrainingRound>,
    name: &str,
    status: &TrainingRoundStatus,
) -> Result<()> {
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

async fn annotate(api: &Api<TrainingRound>, name: &str, key: &str, value: String) -> Result<()> {
    api.patch(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({
            "metadata": { "annotations": { key: value } }
        })),
    )
    .await?;
    Ok(())
}

pub async fn reconcile(round: Arc<TrainingRound>, ctx: Arc<Ctx>) -> Result<Action> {
    let namespace = round
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = round.name_any();
    let rounds: Api<TrainingRound> = Api::namespaced(ctx.client.clone(), &namespace);
    let tasks: Api<WasmTask> = Api::namespaced(ctx.client.clone(), &namespace);

    let status = round.status.clone().unwrap_or_default();
    match status.phase {
        None => {
            patch_status(
                &rounds,
                &name,
                &TrainingRoundStatus {
                    phase: Some(RoundPhase::Pending),
                    ..status
                },
            )
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }

        Some(RoundPhase::Pending) => {
            let seed = seed_update(&round);
            for participant in &round.spec.participants {
                let child = task_name(&name, participant);
                if tasks.get_opt(&child).await?.is_none() {
                    let task = build_task(&round, participant, seed.as_ref());
                    match tasks.create(&PostParams::default(), &task).await {
                        Ok(_) => {}
                        Err(kube::Error::Api(ae)) if ae.code == 409 => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            patch_status(
                &rounds,
                &name,
                &TrainingRoundStatus {
                    phase: Some(RoundPhase::Running),
                    started_at_ms: Some(ctx.epoch_ms()),
                    ..status
                },
            )
            .await?;
            tracing::info!(round = %name, participants = round.spec.participants.len(), "round dispatched");
            Ok(Action::requeue(Duration::from_secs(5)))
        }

        Some(RoundPhase::Running) => {
            let mut collected: Vec<UpdateEnvelope> = Vec::new();
            let mut participant_status = BTreeMap::new();
            for participant in &round.spec.participants {
                let child = tasks.get_opt(&task_name(&name, participant)).await?;
                let phase = child
                    .as_ref()
                    .and_then(|t| t.status.as_ref())
                    .and_then(|s| s.phase);
                participant_status.insert(
                    participant.clone(),
                    phase.map_or_else(|| "Unknown".to_string(), |p| format!("{p:?}")),
                );
                if phase != Some(TaskPhase::Completed) {
                    continue;
                }
                let results = child
                    .as_ref()
                    .and_then(|t| t.status.as_ref())
                    .and_then(|s| s.results.clone());
                if let Some(results) = results {
                    match extract_fl_update(&results) {
                        Ok(envelope) => collected.push(envelope),
                        Err(e) => {
                            tracing::warn!(round = %name, participant = %participant, error = %e, "unusable result");
                        }
                    }
                }
            }

            annotate(
                &rounds,
                &name,
                COLLECTED_UPDATES_ANNOTATION,
                serde_json::to_string(&collected)?,
            )
            .await?;

            if collected.len() as u32 >= round.spec.k_of_n {
                patch_status(
                    &rounds,
                    &name,
                    &TrainingRoundStatus {
                        phase: Some(RoundPhase::Aggregating),
                        collected: collected.len() as u32,
                        participant_status,
                        ..status
                    },
                )
                .await?;
                return Ok(Action::requeue(Duration::from_secs(1)));
            }

            let started = status.started_at_ms.unwrap_or_else(|| ctx.epoch_ms());
            let deadline_ms = round.spec.timeout_seconds * 1_000;
            if deadline_ms > 0 && ctx.epoch_ms().saturating_sub(started) > deadline_ms {
                patch_status(
                    &rounds,
                    &name,
                    &TrainingRoundStatus {
                        phase: Some(RoundPhase::Failed),
                        collected: collected.len() as u32,
                        participant_status,
                        message: Some(format!(
                            "timed out after {}s with {}/{} updates",
                            round.spec.timeout_seconds,
                            collected.len(),
                            round.spec.k_of_n
                        )),
                        ..status
                    },
                )
                .await?;
                return Ok(Action::await_change());
            }

            patch_status(
                &rounds,
                &name,
                &TrainingRoundStatus {
                    collected: collected.len() as u32,
                    participant_status,
                    ..status
                },
            )
            .await?;
            Ok(Action::requeue(Duration::from_secs(5)))
        }

        Some(RoundPhase::Aggregating) => {
            let collected: Vec<UpdateEnvelope> = round
                .annotations()
                .get(COLLECTED_UPDATES_ANNOTATION)
                .map(|raw| serde_json::from_str(raw))
                .transpose()?
                .unwrap_or_default();

            let algorithm = algorithm_for(&ctx, &namespace, &round.spec.job_ref).await;
            let format = collected
                .iter()
                .map(|u| u.format.clone())
                .find(|f| !f.is_empty())
                .unwrap_or(UpdateFormat::JsonF64);
            let record = aggregate(
                &collected,
                &algorithm,
                &format,
                uuid::Uuid::new_v4().to_string(),
                "aggregator",
                ctx.epoch_ms(),
            )?;

            annotate(
                &rounds,
                &name,
                AGGREGATED_UPDATE_ANNOTATION,
                serde_json::to_string(&record)?,
            )
            .await?;
            patch_status(
                &rounds,
                &name,
                &TrainingRoundStatus {
                    phase: Some(RoundPhase::Completed),
                    aggregated_model_ref: Some(record.global_version.clone()),
                    ..status
                },
            )
            .await?;
            tracing::info!(
                round = %name,
                num_samples = record.num_samples,
                clients = collected.len(),
                "round aggregated"
            );
            Ok(Action::await_change())
        }

        Some(RoundPhase::Completed) | Some(RoundPhase::Failed) => Ok(Action::await_change()),
    }
}

/// The owning job's configured aggregation algorithm, defaulting to fedavg.
async fn algorithm_for(ctx: &Ctx, namespace: &str, job_ref: &str) -> String {
    let jobs: Api<FederatedJob> = Api::namespaced(ctx.client.clone(), namespace);
    match jobs.get_opt(job_ref).await {
        Ok(Some(job)) => job
            .spec
            .aggregator
            .map(|a| a.algorithm)
            .unwrap_or_else(|| "fedavg".to_string()),
        _ => "fedavg".to_string(),
    }
}

pub fn error_policy(round: Arc<TrainingRound>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    tracing::warn!(round = %round.name_any(), %error, "training round reconcile failed; requeueing");
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
#[path = "traininground_tests.rs"]
mod tests;
