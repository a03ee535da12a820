// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FederatedJob reconciler.
//!
//! Drives `"" -> Pending -> Running -> {Completed, Failed}`. Each round is an
//! owned TrainingRound child; the aggregated-update annotation from a
//! finished round is propagated into the next one as its seed.

use crate::context::Ctx;
use crate::crd::{
    FederatedJob, FederatedJobSpec, FederatedJobStatus, JobPhase, RoundPhase, TrainingRound,
    TrainingRoundSpec, AGGREGATED_UPDATE_ANNOTATION,
};
use crate::error::{Error, Result};
use kube::api::{ObjectMeta, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Api, Resource, ResourceExt};
use std::sync::Arc;
use std::time::Duration;

/// Validate user-authored spec fields before any child is created.
pub fn validate_spec(spec: &FederatedJobSpec) -> Result<(), String> {
    if spec.experiment_id.trim().is_empty() {
        return Err("experimentId must not be empty".to_string());
    }
    if spec.model_ref.trim().is_empty() {
        return Err("modelRef must not be empty".to_string());
    }
    if spec.wasm_image.trim().is_empty() {
        return Err("wasmImage must not be empty".to_string());
    }
    if spec.participants.is_empty() {
        return Err("at least one participant is required".to_string());
    }
    if spec.k_of_n == 0 || spec.k_of_n as usize > spec.participants.len() {
        return Err(format!(
            "kOfN must be within 1..={}, got {}",
            spec.participants.len(),
            spec.k_of_n
        ));
    }
    if spec.rounds.total == 0 {
        return Err("rounds.total must be positive".to_string());
    }
    Ok(())
}

/// Name of the TrainingRound child for round `n`.
pub fn round_name(job_name: &str, round: u32) -> String {
    format!("{job_name}-round-{round}")
}

/// Build round `n` as an owned child, carrying the previous round's
/// aggregated update when there is one.
pub fn build_round(
    job: &FederatedJob,
    round: u32,
    aggregated_update: Option<String>,
) -> TrainingRound {
    let name = round_name(&job.name_any(), round);
    let mut training_round = TrainingRound::new(
        &name,
        TrainingRoundSpec {
            round_id: u64::from(round),
            job_ref: job.name_any(),
            model_ref: job
                .status
                .as_ref()
                .and_then(|s| s.aggregated_model_ref.clone())
                .unwrap_or_else(|| job.spec.model_ref.clone()),
            wasm_image: job.spec.wasm_image.clone(),
            participants: job.spec.participants.clone(),
            k_of_n: job.spec.k_of_n,
            timeout_seconds: job.spec.rounds.timeout_seconds,
            hyperparameters: job.spec.hyperparameters.clone(),
        },
    );
    training_round.metadata = ObjectMeta {
        name: Some(name),
        namespace: job.namespace(),
        owner_references: job.controller_owner_ref(&()).map(|oref| vec![oref]),
        annotations: aggregated_update.map(|update| {
            [(AGGREGATED_UPDATE_ANNOTATION.to_string(), update)]
                .into_iter()
                .collect()
        }),
        ..ObjectMeta::default()
    };
    training_round
}

async fn patch_status(
    api: &Api<FederatedJob>,
    name: &str,
    status: &FederatedJobStatus,
) -> Result<()> {
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(serde_json::json!({ "status": status })),
    )
    .await?;
    Ok(())
}

/// Create a child round, tolerating a concurrent reconcile having won.
async fn ensure_round(api: &Api<TrainingRound>, round: &TrainingRound) -> Result<()> {
    match api.create(&PostParams::default(), round).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn reconcile(job: Arc<FederatedJob>, ctx: Arc<Ctx>) -> Result<Action> {
    let namespace = job
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = job.name_any();
    let jobs: Api<FederatedJob> = Api::namespaced(ctx.client.clone(), &namespace);
    let rounds: Api<TrainingRound> = Api::namespaced(ctx.client.clone(), &namespace);

    let status = job.status.clone().unwrap_or_default();
    match status.phase {
        None => {
            if let Err(reason) = validate_spec(&job.spec) {
                tracing::warn!(job = %name, reason = %reason, "rejecting federated job");
                patch_status(
                    &jobs,
                    &name,
                    &FederatedJobStatus {
                        phase: Some(JobPhase::Failed),
                        message: Some(reason),
                        ..status
                    },
                )
                .await?;
                return Ok(Action::await_change());
            }
            patch_status(
                &jobs,
                &name,
                &FederatedJobStatus {
                    phase: Some(JobPhase::Pending),
                    ..status
                },
            )
            .await?;
            Ok(Action::requeue(Duration::from_secs(1)))
        }

        Some(JobPhase::Pending) => {
            ensure_round(&rounds, &build_round(&job, 1, None)).await?;
            patch_status(
                &jobs,
                &name,
                &FederatedJobStatus {
                    phase: Some(JobPhase::Running),
                    current_round: 1,
                    ..status
                },
            )
            .await?;
            tracing::info!(job = %name, "round 1 created");
            Ok(Action::requeue(Duration::from_secs(5)))
        }

        Some(JobPhase::Running) => {
            let current = status.current_round.max(1);
            let Some(round) = rounds.get_opt(&round_name(&name, current)).await? else {
                // Child vanished; recreate it
                ensure_round(&rounds, &build_round(&job, current, None)).await?;
                return Ok(Action::requeue(Duration::from_secs(5)));
            };
            let round_phase = round.status.as_ref().and_then(|s| s.phase);

            match round_phase {
                Some(RoundPhase::Completed) => {
                    let completed = status.completed_rounds.max(current);
                    let aggregated_model_ref = round
                        .status
                        .as_ref()
                        .and_then(|s| s.aggregated_model_ref.clone())
                        .or(status.aggregated_model_ref.clone());

                    if completed >= job.spec.rounds.total {
                        patch_status(
                            &jobs,
                            &name,
                            &FederatedJobStatus {
                                phase: Some(JobPhase::Completed),
                                completed_rounds: completed,
                                aggregated_model_ref,
                                ..status
                            },
                        )
                        .await?;
                        tracing::info!(job = %name, rounds = completed, "federated job completed");
                        return Ok(Action::await_change());
                    }

                    let aggregated_update = round
                        .annotations()
                        .get(AGGREGATED_UPDATE_ANNOTATION)
                        .cloned();
                    let next = current + 1;
                    let mut template = job.as_ref().clone();
                    template.status = Some(FederatedJobStatus {
                        aggregated_model_ref: aggregated_model_ref.clone(),
                        ..status.clone()
                    });
                    ensure_round(&rounds, &build_round(&template, next, aggregated_update)).await?;
                    patch_status(
                        &jobs,
                        &name,
                        &FederatedJobStatus {
                            phase: Some(JobPhase::Running),
                            current_round: next,
                            completed_rounds: completed,
                            aggregated_model_ref,
                            ..status
                        },
                    )
                    .await?;
                    tracing::info!(job = %name, round = next, "next round created");
                    Ok(Action::requeue(Duration::from_secs(5)))
                }
                Some(RoundPhase::Failed) => {
                    let message = round
                        .status
                        .as_ref()
                        .and_then(|s| s.message.clone())
                        .unwrap_or_else(|| format!("round {current} failed"));
                    patch_status(
                        &jobs,
                        &name,
                        &FederatedJobStatus {
                            phase: Some(JobPhase::Failed),
                            message: Some(message),
                            ..status
                        },
                    )
                    .await?;
                    Ok(Action::await_change())
                }
                _ => Ok(Action::requeue(Duration::from_secs(10))),
            }
        }

        Some(JobPhase::Completed) | Some(JobPhase::Failed) => Ok(Action::await_change()),
    }
}

pub fn error_policy(job: Arc<FederatedJob>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    tracing::warn!(job = %job.name_any(), %error, "federated job reconcile failed; requeueing");
    Action::requeue(Duration::from_secs(5))
}

#[cfg(test)]
#[path = "federatedjob_tests.rs"]
mod tests;
