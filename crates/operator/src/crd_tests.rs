// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn federated_job_spec_uses_camel_case() {
    let spec: FederatedJobSpec = serde_json::from_value(json!({
        "experimentId": "exp-1",
        "modelRef": "s3://models/seed",
        "wasmImage": "registry/trainer:1",
        "participants": ["p1", "p2"],
        "kOfN": 2,
        "rounds": {"total": 5, "timeoutSeconds": 120},
    }))
    .unwrap();
    assert_eq!(spec.experiment_id, "exp-1");
    assert_eq!(spec.k_of_n, 2);
    assert_eq!(spec.rounds.total, 5);
    assert_eq!(spec.rounds.timeout_seconds, 120);
    assert!(spec.aggregator.is_none());
}

#[test]
fn rounds_timeout_defaults() {
    let spec: FederatedJobSpec = serde_json::from_value(json!({
        "experimentId": "exp-1",
        "modelRef": "m",
        "wasmImage": "i",
        "participants": ["p1"],
        "kOfN": 1,
        "rounds": {"total": 1},
    }))
    .unwrap();
    assert_eq!(spec.rounds.timeout_seconds, 300);
}

#[test]
fn crd_kinds_and_group() {
    use kube::Resource;
    assert_eq!(FederatedJob::kind(&()), "FederatedJob");
    assert_eq!(TrainingRound::kind(&()), "TrainingRound");
    assert_eq!(WasmTask::kind(&()), "WasmTask");
    assert_eq!(PropletGroup::kind(&()), "PropletGroup");
    assert_eq!(FederatedJob::group(&()), GROUP);
}

#[test]
fn wasm_task_status_round_trips_opaque_results() {
    let status = WasmTaskStatus {
        phase: Some(TaskPhase::Completed),
        results: Some(json!({"update_envelope": {"job_id": "j1"}})),
        ..Default::default()
    };
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["phase"], "Completed");
    let back: WasmTaskStatus = serde_json::from_value(value).unwrap();
    assert_eq!(back, status);
}

#[test]
fn group_selector_defaults_to_empty() {
    let spec: PropletGroupSpec = serde_json::from_value(json!({
        "selector": {},
    }))
    .unwrap();
    assert!(spec.selector.match_labels.is_empty());
    assert!(spec.algorithm.is_none());
}
