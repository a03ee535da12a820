// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the manager core

use crate::aggregate::AggregateError;
use crate::scheduler::SchedulerError;
use propeller_adapters::PubSubError;
use propeller_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the task service and its collaborators.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("proplet not found: {0}")]
    PropletNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("proplet {0} is not alive")]
    PropletDead(String),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("task {task_id} is already bound to proplet {bound}")]
    BindConflict { task_id: String, bound: String },
    #[error("transport failure: {0}")]
    Transport(#[from] PubSubError),
    #[error("result envelope mismatch for task {task_id}: {reason}")]
    ResultSpoof { task_id: String, reason: String },
    #[error(transparent)]
    Aggregation(#[from] AggregateError),
    #[error("round deadline exceeded for job {job_id} round {round_id}")]
    Timeout { job_id: String, round_id: u64 },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
