// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    exact = { "m/d/c/control/proplet/alive", "m/d/c/control/proplet/alive", true },
    plus_one_level = { "m/+/c/control/proplet/alive", "m/d/c/control/proplet/alive", true },
    plus_not_multi = { "m/+/control", "m/d/c/control", false },
    hash_tail = { "m/d/c/control/proplet/#", "m/d/c/control/proplet/p1/offline", true },
    hash_matches_empty_rest = { "m/d/c/#", "m/d/c", true },
    hash_at_root = { "#", "anything/at/all", true },
    mismatch = { "m/d/c/control/proplet/alive", "m/d/c/control/proplet/create", false },
    filter_longer = { "a/b/c", "a/b", false },
    topic_longer = { "a/b", "a/b/c", false },
)]
fn topic_matching(filter: &str, topic: &str, expected: bool) {
    assert_eq!(topic_matches(filter, topic), expected);
}

#[yare::parameterized(
    plain = { "m/d/c/control", true },
    plus = { "m/+/c", true },
    hash_last = { "m/d/#", true },
    hash_alone = { "#", true },
    hash_not_last = { "m/#/c", false },
    embedded_plus = { "m/d+x/c", false },
    embedded_hash = { "m/d#/c", false },
    empty = { "", false },
)]
fn filter_validation(filter: &str, ok: bool) {
    assert_eq!(validate_filter(filter).is_ok(), ok);
}
