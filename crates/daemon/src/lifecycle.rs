// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager lifecycle: wiring, startup, shutdown.

use crate::config::{Config, ConfigError};
use crate::handlers;
use propeller_adapters::{CoordinatorClient, CoordinatorError, InProcessBus, PubSub, PubSubError};
use propeller_core::{
    Proplet, PropletId, SystemClock, Task, TopicBuilder, UpdateEnvelope, UuidIdGen,
};
use propeller_engine::{
    DeadlineScanner, PropletRegistry, ResultIngestion, RoundController, TaskService,
};
use propeller_storage::{InMemoryStorage, Storage};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Transport(#[from] PubSubError),
}

/// A wired manager instance and its background tasks.
pub struct Manager {
    pub service: Arc<TaskService<SystemClock>>,
    pub registry: Arc<PropletRegistry<SystemClock>>,
    pub rounds: Arc<RoundController<SystemClock>>,
    pub ingestion: Arc<ResultIngestion<SystemClock>>,
    pub bus: Arc<InProcessBus>,
    pub topics: TopicBuilder,
    cancel: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").finish_non_exhaustive()
    }
}

/// Build the full in-memory stack and start the background loops: the
/// proplet-control subscription pump and the round deadline scanner.
pub async fn startup(config: &Config) -> Result<Manager, LifecycleError> {
    let clock = SystemClock;
    let topics = TopicBuilder::new(&config.domain_id, &config.channel_id);

    let tasks: Arc<dyn Storage<Task>> = Arc::new(InMemoryStorage::new());
    let bindings: Arc<dyn Storage<PropletId>> = Arc::new(InMemoryStorage::new());
    let aggregates: Arc<dyn Storage<UpdateEnvelope>> = Arc::new(InMemoryStorage::new());
    let proplets: Arc<dyn Storage<Proplet>> = Arc::new(InMemoryStorage::new());

    let registry = Arc::new(PropletRegistry::new(
        proplets,
        clock.clone(),
        config.alive_timeout(),
    ));
    let scheduler = config.scheduler_algorithm()?.build();
    let coordinator = match &config.coordinator_url {
        Some(url) => {
            info!(coordinator = %url, "experiment forwarding enabled");
            Some(CoordinatorClient::new(url.clone())?)
        }
        None => None,
    };

    let bus = Arc::new(InProcessBus::new(config.publish_timeout()));
    let service = Arc::new(TaskService::new(
        Arc::clone(&tasks),
        Arc::clone(&bindings),
        Arc::clone(&aggregates),
        Arc::clone(&registry),
        scheduler,
        bus.clone(),
        topics.clone(),
        Arc::new(UuidIdGen),
        clock.clone(),
        coordinator,
    ));
    let rounds = Arc::new(RoundController::new(
        Arc::clone(&service),
        Arc::clone(&tasks),
        Arc::clone(&bindings),
        Arc::clone(&aggregates),
        bus.clone(),
        topics.clone(),
        Arc::new(UuidIdGen),
        clock.clone(),
    ));
    let ingestion = Arc::new(ResultIngestion::new(
        Arc::clone(&tasks),
        Arc::clone(&bindings),
        Arc::clone(&rounds),
        clock.clone(),
    ));

    let cancel = CancellationToken::new();
    let mut background = Vec::new();

    let receiver = bus.subscribe(&topics.proplet_filter()).await?;
    background.push(tokio::spawn(handlers::pump(
        receiver,
        Arc::clone(&registry),
        Arc::clone(&ingestion),
        topics.clone(),
        cancel.child_token(),
    )));

    let scanner = DeadlineScanner::new(Arc::clone(&tasks), Arc::clone(&rounds), clock);
    background.push(tokio::spawn(scanner.run(cancel.child_token())));

    info!(
        domain = %config.domain_id,
        channel = %config.channel_id,
        scheduler = %config.scheduler,
        "manager started"
    );
    Ok(Manager {
        service,
        registry,
        rounds,
        ingestion,
        bus,
        topics,
        cancel,
        background,
    })
}

impl Manager {
    /// Stop background loops and wait for them to drain.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.background {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "background task aborted");
            }
        }
        info!("manager stopped");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
