// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Propeller manager daemon (propellerd)
//!
//! Owns the manager's background loops: the proplet-control subscription
//! pump and the round deadline scanner.

pub mod config;
pub mod handlers;
pub mod lifecycle;

pub use config::{Config, ConfigError};
pub use lifecycle::{startup, LifecycleError, Manager};
