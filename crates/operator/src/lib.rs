// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Kubernetes operator for declarative wasm workloads and federated jobs

pub mod context;
pub mod crd;
pub mod error;
pub mod extract;
pub mod federatedjob;
pub mod propletgroup;
pub mod traininground;
pub mod wasmtask;

pub use context::Ctx;
pub use crd::{
    FederatedJob, FederatedJobSpec, FederatedJobStatus, GroupProplet, JobPhase, PropletGroup,
    PropletGroupSpec, PropletGroupStatus, RoundPhase, TaskPhase, TrainingRound, TrainingRoundSpec,
    TrainingRoundStatus, WasmTask, WasmTaskSpec, WasmTaskStatus, AGGREGATED_UPDATE_ANNOTATION,
    COLLECTED_UPDATES_ANNOTATION, GROUP, RESULT_ANNOTATION,
};
pub use error::{Error, Result};
pub use extract::{extract_fl_update, extract_job_result};
