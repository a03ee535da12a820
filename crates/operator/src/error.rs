// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the operator

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no result found for job {0}")]
    NoResult(String),
    #[error("invalid update envelope: {0}")]
    InvalidUpdate(String),
    #[error("invalid spec: {0}")]
    InvalidSpec(String),
    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),
    #[error(transparent)]
    Aggregation(#[from] propeller_engine::AggregateError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
