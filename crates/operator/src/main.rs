// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Propeller operator
//!
//! Runs the four reconcilers against the cluster the process is deployed in:
//! FederatedJob, TrainingRound, WasmTask, and PropletGroup.

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::controller::Controller;
use kube::runtime::watcher;
use kube::{Api, Client};
use propeller_operator::{
    federatedjob, propletgroup, traininground, wasmtask, Ctx, FederatedJob, PropletGroup,
    TrainingRound, WasmTask,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();

    let client = Client::try_default().await?;
    let ctx = Arc::new(Ctx::new(client.clone()));
    info!("starting propeller operator");

    let jobs = Controller::new(
        Api::<FederatedJob>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<TrainingRound>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(federatedjob::reconcile, federatedjob::error_policy, ctx.clone())
    .for_each(log_result);

    let rounds = Controller::new(
        Api::<TrainingRound>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<WasmTask>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(traininground::reconcile, traininground::error_policy, ctx.clone())
    .for_each(log_result);

    let tasks = Controller::new(
        Api::<WasmTask>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(Api::<Job>::all(client.clone()), watcher::Config::default())
    .run(wasmtask::reconcile, wasmtask::error_policy, ctx.clone())
    .for_each(log_result);

    let groups = Controller::new(
        Api::<PropletGroup>::all(client.clone()),
        watcher::Config::default(),
    )
    .run(propletgroup::reconcile, propletgroup::error_policy, ctx)
    .for_each(log_result);

    tokio::join!(jobs, rounds, tasks, groups);
    Ok(())
}

async fn log_result<T: std::fmt::Debug, E: std::fmt::Display>(result: Result<T, E>) {
    match result {
        Ok(obj) => tracing::debug!(?obj, "reconciled"),
        Err(e) => tracing::warn!(error = %e, "reconcile error"),
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
