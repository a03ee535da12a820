// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use propeller_core::{NewTask, PropletId, TaskId};

fn task() -> Task {
    Task::new(
        NewTask {
            name: "t".to_string(),
            ..Default::default()
        },
        TaskId::new("t1"),
        0,
    )
}

fn proplet(id: &str, alive: bool, task_count: u64) -> Proplet {
    let mut p = Proplet::new(PropletId::new(id), id);
    p.alive = alive;
    p.task_count = task_count;
    p
}

#[test]
fn empty_fleet_is_no_proplet() {
    for scheduler in [
        SchedulerAlgorithm::RoundRobin.build(),
        SchedulerAlgorithm::LeastLoaded.build(),
        SchedulerAlgorithm::Random.build(),
    ] {
        assert_eq!(
            scheduler.select(&task(), &[]).unwrap_err(),
            SchedulerError::NoProplet
        );
    }
}

#[test]
fn dead_fleet_is_all_dead() {
    let fleet = vec![proplet("p1", false, 0), proplet("p2", false, 0)];
    for scheduler in [
        SchedulerAlgorithm::RoundRobin.build(),
        SchedulerAlgorithm::LeastLoaded.build(),
        SchedulerAlgorithm::Random.build(),
    ] {
        assert_eq!(
            scheduler.select(&task(), &fleet).unwrap_err(),
            SchedulerError::AllDead
        );
    }
}

#[test]
fn round_robin_visits_every_alive_proplet() {
    let fleet = vec![
        proplet("p1", true, 0),
        proplet("p2", true, 0),
        proplet("p3", true, 0),
    ];
    let scheduler = RoundRobin::new();
    let picks: Vec<String> = (0..3)
        .map(|_| scheduler.select(&task(), &fleet).unwrap().id.to_string())
        .collect();
    let distinct: std::collections::HashSet<&String> = picks.iter().collect();
    assert_eq!(distinct.len(), 3, "n selections must cover the fleet");
}

#[test]
fn round_robin_skips_dead_proplets() {
    let fleet = vec![
        proplet("p1", true, 0),
        proplet("dead", false, 0),
        proplet("p2", true, 0),
    ];
    let scheduler = RoundRobin::new();
    for _ in 0..6 {
        let pick = scheduler.select(&task(), &fleet).unwrap();
        assert!(pick.alive);
        assert_ne!(pick.id, "dead");
    }
}

#[test]
fn round_robin_cursor_is_stable_across_calls() {
    let fleet = vec![proplet("p1", true, 0), proplet("p2", true, 0)];
    let scheduler = RoundRobin::new();
    let a = scheduler.select(&task(), &fleet).unwrap().id;
    let b = scheduler.select(&task(), &fleet).unwrap().id;
    let c = scheduler.select(&task(), &fleet).unwrap().id;
    assert_ne!(a, b);
    assert_eq!(a, c);
}

#[test]
fn least_loaded_picks_minimum_task_count() {
    let fleet = vec![
        proplet("busy", true, 5),
        proplet("idle", true, 1),
        proplet("dead-idle", false, 0),
    ];
    let pick = LeastLoaded.select(&task(), &fleet).unwrap();
    assert_eq!(pick.id, "idle");
}

#[test]
fn least_loaded_breaks_ties_by_order() {
    let fleet = vec![
        proplet("first", true, 2),
        proplet("second", true, 2),
        proplet("third", true, 2),
    ];
    assert_eq!(LeastLoaded.select(&task(), &fleet).unwrap().id, "first");
}

#[test]
fn random_only_picks_alive() {
    let fleet = vec![
        proplet("p1", true, 0),
        proplet("dead", false, 0),
        proplet("p2", true, 0),
    ];
    for _ in 0..50 {
        let pick = Random.select(&task(), &fleet).unwrap();
        assert_ne!(pick.id, "dead");
    }
}

#[yare::parameterized(
    round_robin = { "round-robin", SchedulerAlgorithm::RoundRobin },
    roundrobin = { "roundrobin", SchedulerAlgorithm::RoundRobin },
    least_loaded = { "least_loaded", SchedulerAlgorithm::LeastLoaded },
    random = { "Random", SchedulerAlgorithm::Random },
)]
fn algorithm_parses(input: &str, expected: SchedulerAlgorithm) {
    assert_eq!(input.parse::<SchedulerAlgorithm>().unwrap(), expected);
}

#[test]
fn unknown_algorithm_is_rejected() {
    assert!("fifo".parse::<SchedulerAlgorithm>().is_err());
}
