// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom resource definitions.
//!
//! `FederatedJob -> TrainingRound -> WasmTask` form an ownership chain;
//! `PropletGroup` materializes a fleet for scheduler-based placement. Users
//! author `.spec` only; every `.status` field is controller-owned.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group for all propeller CRDs.
pub const GROUP: &str = "propeller.absmach.io";

/// Annotation carrying an extracted task result as JSON.
pub const RESULT_ANNOTATION: &str = "propeller.absmach.io/result";

/// Annotation carrying a round's aggregated update envelope as JSON.
pub const AGGREGATED_UPDATE_ANNOTATION: &str = "propeller.absmach.io/aggregated-update";

/// Annotation stashing the envelopes collected so far in a round.
pub const COLLECTED_UPDATES_ANNOTATION: &str = "propeller.absmach.io/collected-updates";

// --- FederatedJob ---

#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "propeller.absmach.io",
    version = "v1alpha1",
    kind = "FederatedJob",
    namespaced,
    status = "FederatedJobStatus",
    shortname = "fedjob"
)]
#[serde(rename_all = "camelCase")]
pub struct FederatedJobSpec {
    pub experiment_id: String,
    /// Seed model reference for round 1.
    pub model_ref: String,
    pub wasm_image: String,
    /// Proplet ids participating in every round.
    pub participants: Vec<String>,
    /// Minimum updates required to aggregate a round.
    pub k_of_n: u32,
    pub rounds: RoundsSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<AggregatorSpec>,
    /// Opaque training hyperparameters passed through to participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperparameters: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoundsSpec {
    pub total: u32,
    /// Per-round collection deadline in seconds.
    #[serde(default = "default_round_timeout")]
    pub timeout_seconds: u64,
}

fn default_round_timeout() -> u64 {
    300
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorSpec {
    pub algorithm: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FederatedJobStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<JobPhase>,
    #[serde(default)]
    pub current_round: u32,
    #[serde(default)]
    pub completed_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_model_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum JobPhase {
    Pending,
    Running,
    Completed,
    Failed,
}

// --- TrainingRound ---

#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "propeller.absmach.io",
    version = "v1alpha1",
    kind = "TrainingRound",
    namespaced,
    status = "TrainingRoundStatus",
    shortname = "tround"
)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRoundSpec {
    pub round_id: u64,
    /// Name of the owning FederatedJob.
    pub job_ref: String,
    pub model_ref: String,
    pub wasm_image: String,
    pub participants: Vec<String>,
    pub k_of_n: u32,
    #[serde(default = "default_round_timeout")]
    pub timeout_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperparameters: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRoundStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<RoundPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default)]
    pub collected: u32,
    /// Participant id -> last observed child-task phase.
    #[serde(default)]
    pub participant_status: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_model_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RoundPhase {
    Pending,
    Running,
    Aggregating,
    Completed,
    Failed,
}

// --- WasmTask ---

#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "propeller.absmach.io",
    version = "v1alpha1",
    kind = "WasmTask",
    namespaced,
    status = "WasmTaskStatus",
    shortname = "wtask"
)]
#[serde(rename_all = "camelCase")]
pub struct WasmTaskSpec {
    pub image: String,
    /// Pin to one proplet; mutually exclusive with `groupRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proplet_id: Option<String>,
    /// Select a proplet from a PropletGroup instead of pinning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ref: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<BTreeMap<String, String>>,
    /// Daemon workloads restart unconditionally.
    #[serde(default)]
    pub daemon: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WasmTaskStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<TaskPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proplet_id: Option<String>,
    /// Node backing the selected proplet, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    /// Extracted result payload, opaque JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum TaskPhase {
    Pending,
    Running,
    Completed,
    Failed,
}

// --- PropletGroup ---

#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "propeller.absmach.io",
    version = "v1alpha1",
    kind = "PropletGroup",
    namespaced,
    status = "PropletGroupStatus",
    shortname = "pgroup"
)]
#[serde(rename_all = "camelCase")]
pub struct PropletGroupSpec {
    pub selector: GroupSelector,
    /// Scheduler algorithm for selection out of this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupSelector {
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropletGroupStatus {
    #[serde(default)]
    pub total_proplets: u32,
    #[serde(default)]
    pub available_proplets: u32,
    #[serde(default)]
    pub proplets: Vec<GroupProplet>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupProplet {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default)]
    pub alive: bool,
    #[serde(default)]
    pub task_count: u64,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod tests;
