// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable name generation for proplets.

use rand::seq::SliceRandom;

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "daring", "eager", "fleet", "gentle", "hazel", "icy", "jolly",
    "keen", "lively", "mellow", "nimble", "opal", "plucky", "quiet", "rustic", "spry", "tidy",
    "umber", "vivid", "wily", "young", "zesty",
];

const ANIMALS: &[&str] = &[
    "otter", "heron", "lynx", "badger", "falcon", "marten", "osprey", "pika", "stoat", "wren",
    "beaver", "condor", "dingo", "egret", "ferret", "gecko", "ibis", "jackal", "kestrel", "moth",
];

/// Generate a random `adjective-animal` name.
///
/// Names are presentation-only; identity always comes from the proplet id.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&"plain");
    let animal = ANIMALS.choose(&mut rng).unwrap_or(&"proplet");
    format!("{adjective}-{animal}")
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;
