// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire payloads exchanged over the control plane.
//!
//! Serializes exactly the shape proplets consume; internal-only task fields
//! (timestamps, results) never leak into commands.

use crate::fl::{FlSpec, Hyperparameters, UpdateFormat};
use crate::proplet::PropletId;
use crate::task::{b64_file, Task, TaskId, TaskMode, TaskState};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// START command published to `.../control/manager/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, with = "b64_file", skip_serializing_if = "Option::is_none")]
    pub file: Option<Vec<u8>>,
    #[serde(default)]
    pub inputs: Vec<u64>,
    #[serde(default)]
    pub cli_args: Vec<String>,
    #[serde(default)]
    pub daemon: bool,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_profile: Option<serde_json::Value>,
    pub proplet_id: PropletId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TaskMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fl: Option<StartFl>,
}

impl StartPayload {
    /// Build the command for a task already bound to `proplet_id`.
    pub fn from_task(task: &Task, proplet_id: PropletId) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            state: task.state,
            image_url: task.image_url.clone(),
            file: task.file.clone(),
            inputs: task.inputs.clone(),
            cli_args: task.cli_args.clone(),
            daemon: task.daemon,
            env: task.env.clone(),
            monitoring_profile: task.monitoring_profile.clone(),
            proplet_id,
            mode: task.fl.as_ref().map(|_| task.mode),
            fl: task.fl.as_ref().map(StartFl::from),
        }
    }
}

/// FL block of a START command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartFl {
    pub job_id: String,
    pub round_id: u64,
    pub global_version: String,
    pub min_participants: u64,
    pub round_timeout_sec: u64,
    pub algorithm: String,
    pub update_format: UpdateFormat,
    pub hyperparams: Hyperparameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_ref: Option<String>,
}

impl From<&FlSpec> for StartFl {
    fn from(spec: &FlSpec) -> Self {
        Self {
            job_id: spec.job_id.clone(),
            round_id: spec.round_id,
            global_version: spec.global_version.clone(),
            min_participants: spec.min_participants,
            round_timeout_sec: spec.round_timeout_s,
            algorithm: spec.algorithm.clone(),
            update_format: spec.update_format.clone(),
            hyperparams: spec.hyperparameters.clone(),
            model_ref: spec.model_ref.clone(),
        }
    }
}

/// STOP command published to `.../control/manager/stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopPayload {
    pub id: TaskId,
    pub proplet_id: PropletId,
}

/// Proplet-reported result on `.../control/proplet/results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsMessage {
    pub task_id: TaskId,
    pub results: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Identity-bearing message on `create`/`alive` topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropletAnnouncement {
    pub proplet_id: PropletId,
}

/// Broker-driven last-will payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflinePayload {
    pub status: String,
    pub proplet_id: PropletId,
}

impl OfflinePayload {
    pub fn new(proplet_id: PropletId) -> Self {
        Self {
            status: "offline".to_string(),
            proplet_id,
        }
    }
}

/// Round-aggregate announcement on `.../control/manager/fl/aggregated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPayload {
    pub job_id: String,
    pub round_id: u64,
    pub global_version: String,
    pub update_b64: String,
    pub format: UpdateFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<IndexMap<String, serde_json::Value>>,
    pub num_samples: u64,
    /// Distinct proplet ids whose updates went into the aggregate.
    pub aggregated_from: Vec<String>,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
