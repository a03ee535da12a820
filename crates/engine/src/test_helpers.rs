// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wiring for engine tests: the full in-memory stack.

use crate::deadline::DeadlineScanner;
use crate::registry::PropletRegistry;
use crate::results::ResultIngestion;
use crate::rounds::RoundController;
use crate::scheduler::RoundRobin;
use crate::service::TaskService;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use propeller_adapters::FakePubSub;
use propeller_core::{
    FakeClock, NewTask, Proplet, PropletId, SequentialIdGen, Task, TaskMode, TopicBuilder,
    UpdateEnvelope, DEFAULT_ALIVE_TIMEOUT,
};
use propeller_storage::{InMemoryStorage, Storage};
use serde_json::json;
use std::sync::Arc;

pub struct TestStack {
    pub service: Arc<TaskService<FakeClock>>,
    pub rounds: Arc<RoundController<FakeClock>>,
    pub ingestion: ResultIngestion<FakeClock>,
    pub scanner: DeadlineScanner<FakeClock>,
    pub registry: Arc<PropletRegistry<FakeClock>>,
    pub pubsub: Arc<FakePubSub>,
    pub tasks: Arc<dyn Storage<Task>>,
    pub bindings: Arc<dyn Storage<PropletId>>,
    pub aggregates: Arc<dyn Storage<UpdateEnvelope>>,
    pub topics: TopicBuilder,
    pub clock: FakeClock,
}

pub fn stack() -> TestStack {
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
    let idgen = Arc::new(SequentialIdGen::new("task"));

    let service = Arc::new(TaskService::new(
        Arc::clone(&tasks),
        Arc::clone(&bindings),
        Arc::clone(&aggregates),
        Arc::clone(&registry),
        Arc::new(RoundRobin::new()),
        pubsub.clone(),
        topics.clone(),
        idgen.clone(),
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

    TestStack {
        service,
        rounds,
        ingestion,
        scanner,
        registry,
        pubsub,
        tasks,
        bindings,
        aggregates,
        topics,
        clock,
    }
}

pub async fn alive(stack: &TestStack, id: &str) {
    stack
        .registry
        .handle_alive(&PropletId::new(id))
        .await
        .expect("alive");
}

/// A training task pinned to one proplet for a given round.
pub fn train_draft(name: &str, job: &str, round: u64, pinned: &str) -> NewTask {
    NewTask {
        name: name.to_string(),
        image_url: "oci://registry/model:1".to_string(),
        mode: Some(TaskMode::Train),
        fl: Some(
            serde_json::from_value(json!({
                "job_id": job,
                "round_id": round,
                "global_version": "seed-v0",
                "min_participants": 2,
                "round_timeout_s": 60,
                "total_rounds": 3,
            }))
            .expect("fl spec"),
        ),
        proplet_id: Some(PropletId::new(pinned)),
        ..Default::default()
    }
}

/// A `json-f64` results payload as a proplet would report it.
pub fn update_json(
    task_id: &str,
    job: &str,
    round: u64,
    proplet: &str,
    num_samples: u64,
    vector: &[f64],
) -> serde_json::Value {
    json!({
        "task_id": task_id,
        "job_id": job,
        "round_id": round,
        "global_version": "seed-v0",
        "proplet_id": proplet,
        "num_samples": num_samples,
        "update_b64": STANDARD.encode(serde_json::to_vec(vector).expect("vector")),
        "format": "json-f64",
    })
}

pub fn decode_vector(envelope: &UpdateEnvelope) -> Vec<f64> {
    serde_json::from_slice(&envelope.decode_payload().expect("payload")).expect("vector")
}
