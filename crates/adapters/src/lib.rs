// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Adapters for external I/O

mod bus;
mod coordinator;
pub mod pubsub;

pub use bus::InProcessBus;
pub use coordinator::{CoordinatorClient, CoordinatorError, COORDINATOR_URL_ENV};
pub use pubsub::{topic_matches, LastWill, Message, PubSub, PubSubError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePubSub, PublishCall};
