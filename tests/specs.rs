// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios over the full in-memory manager stack.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use propeller_adapters::FakePubSub;
use propeller_core::{
    aggregate_key, FakeClock, NewTask, Proplet, PropletId, ResultsMessage, SequentialIdGen, Task,
    TaskId, TaskMode, TaskState, TopicBuilder, UpdateEnvelope, DEFAULT_ALIVE_TIMEOUT,
};
use propeller_engine::{
    DeadlineScanner, PropletRegistry, ResultIngestion, RoundController, RoundRobin, ServiceError,
    TaskService,
};
use propeller_storage::{InMemoryStorage, Storage};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Manager {
    service: Arc<TaskService<FakeClock>>,
    rounds: Arc<RoundController<FakeClock>>,
    ingestion: ResultIngestion<FakeClock>,
    scanner: DeadlineScanner<FakeClock>,
    registry: Arc<PropletRegistry<FakeClock>>,
    pubsub: Arc<FakePubSub>,
    bindings: Arc<dyn Storage<PropletId>>,
    aggregates: Arc<dyn Storage<UpdateEnvelope>>,
    topics: TopicBuilder,
    clock: FakeClock,
}

fn manager() -> Manager {
    let clock = FakeClock::new();
    let tasks: Arc<dyn Storage<Task>> = Arc::new(InMemoryStorage::new());
    let bindings: Arc<dyn Storage<PropletId>> = Arc::new(InMemoryStorage::new());
    let aggregates: Arc<dyn Storage<UpdateEnvelope>> = Arc::new(InMemoryStorage::new());
    let proplets: Arc<dyn Storage<Proplet>> = Arc::new(InMemoryStorage::new());
    let registry = Arc::new(PropletRegistry::new(
        proplets,
        clock.clone(),
        DEFAULT_ALIVE_TIMEOUT,
    ));
    let pubsub = Arc::new(FakePubSub::new());
    let topics = TopicBuilder::new("d1", "c1");
    let service = Arc::new(TaskService::new(
        Arc::clone(&tasks),
        Arc::clone(&bindings),
        Arc::clone(&aggregates),
        Arc::clone(&registry),
        Arc::new(RoundRobin::new()),
        pubsub.clone(),
        topics.clone(),
        Arc::new(SequentialIdGen::new("task")),
        clock.clone(),
        None,
    ));
    let rounds = Arc::new(RoundController::new(
        Arc::clone(&service),
        Arc::clone(&tasks),
        Arc::clone(&bindings),
        Arc::clone(&aggregates),
        pubsub.clone(),
        topics.clone(),
        Arc::new(SequentialIdGen::new("version")),
        clock.clone(),
    ));
    let ingestion = ResultIngestion::new(
        Arc::clone(&tasks),
        Arc::clone(&bindings),
        Arc::clone(&rounds),
        clock.clone(),
    );
    let scanner = DeadlineScanner::new(Arc::clone(&tasks), Arc::clone(&rounds), clock.clone());
    Manager {
        service,
        rounds,
        ingestion,
        scanner,
        registry,
        pubsub,
        bindings,
        aggregates,
        topics,
        clock,
    }
}

async fn alive(m: &Manager, id: &str) {
    m.registry.handle_alive(&PropletId::new(id)).await.unwrap();
}

fn train_draft(name: &str, job: &str, round: u64, k: u64, pinned: &str) -> NewTask {
    NewTask {
        name: name.to_string(),
        image_url: "oci://registry/model:1".to_string(),
        mode: Some(TaskMode::Train),
        fl: Some(
            serde_json::from_value(json!({
                "job_id": job,
                "round_id": round,
                "global_version": "seed-v0",
                "min_participants": k,
                "round_timeout_s": 60,
                "total_rounds": 3,
            }))
            .unwrap(),
        ),
        proplet_id: Some(PropletId::new(pinned)),
        ..Default::default()
    }
}

async fn start_train(m: &Manager, name: &str, job: &str, round: u64, k: u64, pinned: &str) -> TaskId {
    alive(m, pinned).await;
    let task = m
        .service
        .create_task(train_draft(name, job, round, k, pinned))
        .await
        .unwrap();
    m.service.start_task(&task.id).await.unwrap();
    task.id
}

fn vector_payload(task_id: &str, job: &str, round: u64, proplet: &str, samples: u64, v: &[f64]) -> serde_json::Value {
    json!({
        "task_id": task_id,
        "job_id": job,
        "round_id": round,
        "global_version": "seed-v0",
        "proplet_id": proplet,
        "num_samples": samples,
        "update_b64": STANDARD.encode(serde_json::to_vec(v).unwrap()),
        "format": "json-f64",
    })
}

async fn report(m: &Manager, id: &TaskId, payload: serde_json::Value) -> Result<(), ServiceError> {
    m.ingestion
        .handle(ResultsMessage {
            task_id: id.clone(),
            results: payload,
            error: None,
        })
        .await
}

/// Scenario 1: two proplets, FedAvg over one round, next round seeded from
/// the aggregate.
#[tokio::test]
async fn two_proplet_fedavg() {
    let m = manager();
    let t1 = start_train(&m, "train-p1", "J", 1, 2, "P1").await;
    let t2 = start_train(&m, "train-p2", "J", 1, 2, "P2").await;

    report(&m, &t1, vector_payload(t1.as_str(), "J", 1, "P1", 10, &[1.0, 2.0, 3.0]))
        .await
        .unwrap();
    report(&m, &t2, vector_payload(t2.as_str(), "J", 1, "P2", 20, &[2.0, 3.0, 4.0]))
        .await
        .unwrap();

    let record = m.aggregates.get(&aggregate_key("J", 1)).await.unwrap();
    assert_eq!(record.num_samples, 30);
    assert_eq!(record.proplet_id, "manager");
    assert!(!record.global_version.is_empty());
    assert_ne!(record.global_version, "seed-v0");

    let expected = [50.0 / 30.0, 80.0 / 30.0, 110.0 / 30.0];
    let avg: Vec<f64> =
        serde_json::from_slice(&record.decode_payload().unwrap()).unwrap();
    for (a, e) in avg.iter().zip(expected) {
        assert!((a - e).abs() / e.abs().max(1.0) < 1e-9);
    }

    // One aggregated announcement on the control plane
    assert_eq!(m.pubsub.calls_to(&m.topics.fl_aggregated()).len(), 1);

    // A round-2 task per proplet, seeded with the aggregate
    let round2 = m.rounds.round_tasks("J", 2).await.unwrap();
    assert_eq!(round2.len(), 2);
    let expected_b64 = STANDARD.encode(serde_json::to_vec(&avg).unwrap());
    for task in &round2 {
        assert_eq!(task.env.get("FL_ROUND_ID").unwrap(), "2");
        assert_eq!(task.env.get("FL_GLOBAL_UPDATE_B64").unwrap(), &expected_b64);
    }
}

/// Scenario 2: mismatched dimensions abort aggregation and release the
/// latch; nothing is persisted.
#[tokio::test]
async fn dimension_mismatch_keeps_round_open() {
    let m = manager();
    let t1 = start_train(&m, "train-p1", "J", 1, 2, "P1").await;
    let t2 = start_train(&m, "train-p2", "J", 1, 2, "P2").await;

    report(&m, &t1, vector_payload(t1.as_str(), "J", 1, "P1", 10, &[1.0, 2.0, 3.0]))
        .await
        .unwrap();
    report(&m, &t2, vector_payload(t2.as_str(), "J", 1, "P2", 20, &[1.0, 2.0, 3.0, 4.0]))
        .await
        .unwrap();

    assert!(m.aggregates.get(&aggregate_key("J", 1)).await.is_err());
    assert!(m.pubsub.calls_to(&m.topics.fl_aggregated()).is_empty());

    // Latch released: the next trigger re-evaluates rather than skipping
    assert!(m.rounds.try_aggregate_and_advance("J", 1, false).await.is_err());
}

/// Scenario 3: a late third update never triggers a second aggregation.
#[tokio::test]
async fn late_update_after_completion_is_ignored() {
    let m = manager();
    let t1 = start_train(&m, "train-p1", "J", 1, 2, "P1").await;
    let t2 = start_train(&m, "train-p2", "J", 1, 2, "P2").await;

    report(&m, &t1, vector_payload(t1.as_str(), "J", 1, "P1", 10, &[1.0])).await.unwrap();
    report(&m, &t2, vector_payload(t2.as_str(), "J", 1, "P2", 20, &[2.0])).await.unwrap();
    let first = m.aggregates.get(&aggregate_key("J", 1)).await.unwrap();

    let t3 = start_train(&m, "train-p3", "J", 1, 2, "P3").await;
    report(&m, &t3, vector_payload(t3.as_str(), "J", 1, "P3", 99, &[7.0])).await.unwrap();

    let task3 = m.service.get_task(&t3).await.unwrap();
    assert_eq!(task3.state, TaskState::Completed);
    assert_eq!(m.pubsub.calls_to(&m.topics.fl_aggregated()).len(), 1);
    let unchanged = m.aggregates.get(&aggregate_key("J", 1)).await.unwrap();
    assert_eq!(unchanged, first, "single-shot aggregation");
}

/// Scenario 4: deadline passes with one of three updates; the partial
/// aggregate seeds the next round.
#[tokio::test]
async fn timeout_with_partial_completion() {
    let m = manager();
    let t1 = start_train(&m, "train-p1", "J", 1, 3, "P1").await;
    let _t2 = start_train(&m, "train-p2", "J", 1, 3, "P2").await;
    let _t3 = start_train(&m, "train-p3", "J", 1, 3, "P3").await;

    report(&m, &t1, vector_payload(t1.as_str(), "J", 1, "P1", 12, &[0.5, 1.5]))
        .await
        .unwrap();
    assert!(
        m.aggregates.get(&aggregate_key("J", 1)).await.is_err(),
        "one of three expected is not enough before the deadline"
    );

    m.clock.advance(Duration::from_secs(61));
    for proplet in ["P1", "P2", "P3"] {
        alive(&m, proplet).await;
    }
    m.scanner.scan().await.unwrap();

    let record = m.aggregates.get(&aggregate_key("J", 1)).await.unwrap();
    assert_eq!(record.num_samples, 12, "only P1's samples");

    let round2 = m.rounds.round_tasks("J", 2).await.unwrap();
    assert!(!round2.is_empty());
    for task in &round2 {
        assert_eq!(
            task.env.get("FL_GLOBAL_UPDATE_B64").unwrap(),
            &record.update_b64
        );
    }
}

/// Scenario 5: an envelope claiming another proplet's identity is rejected
/// and the task fails.
#[tokio::test]
async fn spoofed_update_is_rejected() {
    let m = manager();
    alive(&m, "P2").await;
    let t1 = start_train(&m, "train-p1", "J", 1, 2, "P1").await;

    let err = report(&m, &t1, vector_payload(t1.as_str(), "J", 1, "P2", 10, &[1.0]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ResultSpoof { .. }));

    let task = m.service.get_task(&t1).await.unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert!(task.error.unwrap().contains("does not match"));
    assert!(m.aggregates.get(&aggregate_key("J", 1)).await.is_err());
}

/// A START publish failure must leave no binding behind.
#[tokio::test]
async fn publish_failure_leaves_no_binding() {
    let m = manager();
    alive(&m, "P1").await;
    let task = m
        .service
        .create_task(NewTask {
            name: "demo".to_string(),
            image_url: "oci://registry/app:1".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    m.pubsub.set_fail_publish(true);
    assert!(m.service.start_task(&task.id).await.is_err());
    assert!(m.bindings.get(task.id.as_str()).await.is_err());

    m.pubsub.set_fail_publish(false);
    m.service.start_task(&task.id).await.unwrap();
    assert_eq!(
        m.bindings.get(task.id.as_str()).await.unwrap(),
        "P1"
    );
}

/// A result for an unknown task id is silently dropped.
#[tokio::test]
async fn unknown_task_result_is_dropped() {
    let m = manager();
    report(&m, &TaskId::new("ghost"), json!({"exit": 0}))
        .await
        .unwrap();
}

/// Binding exclusivity: a task already bound to one proplet cannot be bound
/// to another.
#[tokio::test]
async fn binding_is_exclusive() {
    let m = manager();
    alive(&m, "P2").await;
    let task = m
        .service
        .create_task(train_draft("trainer", "J2", 1, 1, "P2"))
        .await
        .unwrap();

    // A racing dispatch already bound this task elsewhere
    m.bindings
        .create(task.id.as_str(), PropletId::new("P1"))
        .await
        .unwrap();

    let err = m.service.start_task(&task.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::BindConflict { .. }));
    assert_eq!(
        m.bindings.get(task.id.as_str()).await.unwrap(),
        "P1",
        "original binding survives"
    );
}

/// N identical alive messages leave task_count untouched and liveness
/// governed by the last message's age.
#[tokio::test]
async fn liveness_is_idempotent() {
    let m = manager();
    for _ in 0..10 {
        alive(&m, "P1").await;
    }
    let proplet = m.registry.get_proplet(&PropletId::new("P1")).await.unwrap();
    assert!(proplet.alive);
    assert_eq!(proplet.task_count, 0);

    m.clock.advance(Duration::from_secs(11));
    let proplet = m.registry.get_proplet(&PropletId::new("P1")).await.unwrap();
    assert!(!proplet.alive);
}
