// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;

#[test]
fn aggregate_key_layout() {
    assert_eq!(aggregate_key("job-1", 3), "fl/job-1/3/aggregate");
}

#[yare::parameterized(
    json_f64 = { "json-f64", UpdateFormat::JsonF64 },
    opaque = { "weights-v2", UpdateFormat::Other("weights-v2".to_string()) },
    empty = { "", UpdateFormat::Other(String::new()) },
)]
fn update_format_round_trips(s: &str, expected: UpdateFormat) {
    let format = UpdateFormat::from(s);
    assert_eq!(format, expected);
    assert_eq!(format.as_str(), s);
    let encoded = serde_json::to_value(&format).unwrap();
    assert_eq!(encoded, json!(s));
    let decoded: UpdateFormat = serde_json::from_value(encoded).unwrap();
    assert_eq!(decoded, format);
}

#[test]
fn update_format_emptiness() {
    assert!(UpdateFormat::from("").is_empty());
    assert!(!UpdateFormat::JsonF64.is_empty());
    assert!(!UpdateFormat::from("binary").is_empty());
}

#[test]
fn fl_spec_defaults() {
    let spec: FlSpec = serde_json::from_value(json!({
        "job_id": "j1",
        "round_id": 1,
    }))
    .unwrap();
    assert_eq!(spec.algorithm, "fedavg");
    assert_eq!(spec.update_format, UpdateFormat::JsonF64);
    assert_eq!(spec.total_rounds, 0);
    assert!(spec.model_ref.is_none());
    assert!(spec.matches("j1", 1));
    assert!(!spec.matches("j1", 2));
    assert!(!spec.matches("j2", 1));
}

#[test]
fn hyperparameters_preserve_unknown_fields() {
    let hp: Hyperparameters = serde_json::from_value(json!({
        "epochs": 5,
        "batch_size": 32,
        "learning_rate": 0.01,
        "momentum": 0.9,
        "optimizer": "sgd",
    }))
    .unwrap();
    assert_eq!(hp.epochs, 5);
    assert_eq!(hp.extra.get("momentum"), Some(&json!(0.9)));
    assert_eq!(hp.extra.get("optimizer"), Some(&json!("sgd")));

    let round_tripped = serde_json::to_value(&hp).unwrap();
    assert_eq!(round_tripped["momentum"], json!(0.9));
}

#[test]
fn envelope_decodes_typed_shape() {
    let env: UpdateEnvelope = serde_json::from_value(json!({
        "task_id": "t1",
        "job_id": "j1",
        "round_id": 2,
        "global_version": "v1",
        "proplet_id": "p1",
        "num_samples": 10,
        "update_b64": "WzEuMF0=",
        "format": "json-f64",
    }))
    .unwrap();
    assert_eq!(env.round_id, 2);
    assert_eq!(env.num_samples, 10);
    assert!(env.format.is_json_f64());
}

#[yare::parameterized(
    number = { json!(3) },
    string = { json!("3") },
    float = { json!(3.0) },
)]
fn envelope_round_id_is_lenient(round_id: serde_json::Value) {
    let env = UpdateEnvelope::from_results_value(&json!({
        "job_id": "j1",
        "round_id": round_id,
        "update_b64": "",
    }))
    .unwrap();
    assert_eq!(env.round_id, 3);
}

#[test]
fn envelope_rejects_negative_round_id() {
    let err = UpdateEnvelope::from_results_value(&json!({
        "job_id": "j1",
        "round_id": -1,
        "update_b64": "",
    }));
    assert!(err.is_err());
}

#[test]
fn envelope_payload_round_trip() {
    let payload = serde_json::to_vec(&[1.0f64, 2.0, 3.0]).unwrap();
    let env = UpdateEnvelope {
        task_id: String::new(),
        job_id: "j1".to_string(),
        round_id: 1,
        global_version: "v1".to_string(),
        proplet_id: "p1".to_string(),
        num_samples: 1,
        update_b64: STANDARD.encode(&payload),
        format: UpdateFormat::JsonF64,
        metrics: None,
    };
    assert_eq!(env.decode_payload().unwrap(), payload);
}

#[test]
fn envelope_rejects_bad_base64() {
    let env = UpdateEnvelope {
        task_id: String::new(),
        job_id: "j1".to_string(),
        round_id: 1,
        global_version: String::new(),
        proplet_id: "p1".to_string(),
        num_samples: 1,
        update_b64: "not base64!!".to_string(),
        format: UpdateFormat::JsonF64,
        metrics: None,
    };
    assert!(env.decode_payload().is_err());
}
