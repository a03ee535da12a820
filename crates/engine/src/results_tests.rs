// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{alive, stack, train_draft, update_json, TestStack};
use propeller_core::{NewTask, TaskId};
use serde_json::json;

async fn standard_task(s: &TestStack) -> TaskId {
    alive(s, "p1").await;
    let task = s
        .service
        .create_task(NewTask {
            name: "plain".to_string(),
            image_url: "oci://registry/app:1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    s.service.start_task(&task.id).await.unwrap();
    task.id
}

async fn train_task(s: &TestStack, proplet: &str) -> TaskId {
    alive(s, proplet).await;
    let task = s
        .service
        .create_task(train_draft("trainer", "j1", 1, proplet))
        .await
        .unwrap();
    s.service.start_task(&task.id).await.unwrap();
    task.id
}

#[tokio::test]
async fn unknown_task_is_dropped_silently() {
    let s = stack();
    s.ingestion
        .handle(ResultsMessage {
            task_id: TaskId::new("never-created"),
            results: json!({"ok": true}),
            error: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn standard_result_is_stored_verbatim() {
    let s = stack();
    let id = standard_task(&s).await;

    s.ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: json!({"stdout": "hello", "exit": 0}),
            error: None,
        })
        .await
        .unwrap();

    let task = s.service.get_task(&id).await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert!(task.finished_at_ms.is_some());
    match task.results.unwrap() {
        TaskResults::Value(v) => assert_eq!(v, json!({"stdout": "hello", "exit": 0})),
        TaskResults::Update(_) => panic!("standard task must not store an envelope"),
    }
}

#[tokio::test]
async fn standard_result_records_error_string() {
    let s = stack();
    let id = standard_task(&s).await;

    s.ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: json!({"exit": 3}),
            error: Some("wasm trap: out of bounds".to_string()),
        })
        .await
        .unwrap();

    let task = s.service.get_task(&id).await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.error.as_deref(), Some("wasm trap: out of bounds"));
}

#[tokio::test]
async fn duplicate_result_for_terminal_task_is_dropped() {
    let s = stack();
    let id = standard_task(&s).await;

    let msg = ResultsMessage {
        task_id: id.clone(),
        results: json!({"exit": 0}),
        error: None,
    };
    s.ingestion.handle(msg.clone()).await.unwrap();
    let first = s.service.get_task(&id).await.unwrap();

    s.ingestion.handle(msg).await.unwrap();
    let second = s.service.get_task(&id).await.unwrap();
    assert_eq!(first, second, "terminal task must not change");
}

#[tokio::test]
async fn fl_update_is_committed_as_envelope() {
    let s = stack();
    let id = train_task(&s, "p1").await;

    s.ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: update_json(id.as_str(), "j1", 1, "p1", 10, &[1.0, 2.0]),
            error: None,
        })
        .await
        .unwrap();

    let task = s.service.get_task(&id).await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    let envelope = task.results.unwrap();
    let envelope = envelope.as_update().unwrap();
    assert_eq!(envelope.proplet_id, "p1");
    assert_eq!(envelope.num_samples, 10);
}

#[tokio::test]
async fn fl_round_mismatch_fails_task() {
    let s = stack();
    let id = train_task(&s, "p1").await;

    let err = s
        .ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: update_json(id.as_str(), "j1", 7, "p1", 10, &[1.0]),
            error: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResultSpoof { .. }));

    let task = s.service.get_task(&id).await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert!(task.error.unwrap().contains("does not match task round"));
}

#[tokio::test]
async fn fl_job_mismatch_fails_task() {
    let s = stack();
    let id = train_task(&s, "p1").await;

    let err = s
        .ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: update_json(id.as_str(), "other-job", 1, "p1", 10, &[1.0]),
            error: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResultSpoof { .. }));
}

#[tokio::test]
async fn spoofed_proplet_is_rejected() {
    let s = stack();
    alive(&s, "p2").await;
    let id = train_task(&s, "p1").await;

    // p1's task reports an envelope claiming to be p2
    let err = s
        .ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: update_json(id.as_str(), "j1", 1, "p2", 10, &[1.0]),
            error: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResultSpoof { .. }));

    let task = s.service.get_task(&id).await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert!(task.error.unwrap().contains("does not match bound proplet"));
    assert!(
        !s.rounds.is_aggregated("j1", 1).await,
        "no aggregation progress from a spoofed update"
    );
}

#[tokio::test]
async fn empty_proplet_id_is_rejected() {
    let s = stack();
    let id = train_task(&s, "p1").await;

    let err = s
        .ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: update_json(id.as_str(), "j1", 1, "", 10, &[1.0]),
            error: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResultSpoof { .. }));
}

#[tokio::test]
async fn malformed_envelope_fails_task() {
    let s = stack();
    let id = train_task(&s, "p1").await;

    let err = s
        .ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            // no job_id / update_b64: not decodable as an envelope
            results: json!({"stdout": "not an envelope"}),
            error: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let task = s.service.get_task(&id).await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
}

#[tokio::test]
async fn fl_completion_triggers_aggregation() {
    let s = stack();
    let id = train_task(&s, "p1").await;

    s.ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: update_json(id.as_str(), "j1", 1, "p1", 10, &[1.0]),
            error: None,
        })
        .await
        .unwrap();

    assert!(s.rounds.is_aggregated("j1", 1).await);
    assert_eq!(s.pubsub.calls_to(&s.topics.fl_aggregated()).len(), 1);
}
