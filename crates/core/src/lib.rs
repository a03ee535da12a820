// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! propeller-core: domain types for the propeller manager

pub mod clock;
pub mod fl;
pub mod id;
pub mod message;
pub mod names;
pub mod proplet;
pub mod task;
pub mod topics;

pub use clock::{Clock, FakeClock, SystemClock};
pub use fl::{aggregate_key, FlSpec, Hyperparameters, UpdateEnvelope, UpdateFormat};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use message::{
    AggregatedPayload, OfflinePayload, PropletAnnouncement, ResultsMessage, StartFl, StartPayload,
    StopPayload,
};
pub use proplet::{Proplet, PropletId, ALIVE_HISTORY_LEN, DEFAULT_ALIVE_TIMEOUT};
pub use task::{
    InvalidTransition, NewTask, Task, TaskId, TaskKind, TaskMode, TaskResults, TaskState,
};
pub use topics::{PropletMessageKind, TopicBuilder};
