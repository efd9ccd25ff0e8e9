//! Start-time derivation tests.
//!
//! These tests verify the backward scheduler against whole recipes: every
//! step starts after its prerequisites and the critical chain lands on the
//! target.

use std::collections::HashSet;

use chrono::TimeDelta;

use mise::core::{GraphIssue, ScheduleCalculator, Task, TaskGraph, TaskId};
use mise::Error;
use tokio_test::assert_ok;

use crate::fixtures::{chain_steps, cyclic_steps, diamond_steps, dinner_time, independent_steps, secs};

/// Test: Linear chain, no buffer
/// Given task1 (300 s) then task2 (600 s)
/// When scheduled for T
/// Then task2 runs [T-600, T] and task1 runs [T-900, T-600]
#[test]
fn test_linear_chain_lands_on_target() {
    let target = dinner_time();
    let schedule = ScheduleCalculator::new(TimeDelta::zero())
        .schedule(&chain_steps(), target)
        .unwrap();

    let task1 = schedule.get("task1").unwrap();
    let task2 = schedule.get("task2").unwrap();
    assert_eq!(task2.start, target - secs(600));
    assert_eq!(task2.end, target);
    assert_eq!(task1.start, target - secs(900));
    assert_eq!(task1.end, target - secs(600));
}

/// Test: Diamond recipe
/// Given preheat, chop -> saute, and bake after both
/// When scheduled for 18:00 with the default buffer
/// Then chop -> saute -> bake is critical and bake ends at 18:00
#[test]
fn test_diamond_critical_chain() {
    let target = dinner_time();
    let calculator = ScheduleCalculator::default();
    let schedule = calculator.schedule(&diamond_steps(), target).unwrap();

    let critical: Vec<&str> = schedule.critical_path.iter().map(|id| id.as_str()).collect();
    assert_eq!(critical, vec!["chop", "saute", "bake"]);

    let bake = schedule.get("bake").unwrap();
    let saute = schedule.get("saute").unwrap();
    let chop = schedule.get("chop").unwrap();
    let preheat = schedule.get("preheat").unwrap();

    assert_eq!(bake.start, target - secs(1800));
    assert_eq!(bake.end, target);
    assert!(saute.end + calculator.buffer() <= bake.start);
    assert_eq!(chop.start, schedule.earliest_start().unwrap());
    // preheat floats to the anchor rather than sliding toward bake
    assert_eq!(preheat.start, chop.start);
    assert_eq!(schedule.latest_end(), Some(target));
}

/// Test: Every step starts no earlier than each prerequisite ends
#[test]
fn test_prerequisites_finish_first() {
    let buffer = secs(45);
    let steps = diamond_steps();
    let schedule = ScheduleCalculator::new(buffer)
        .schedule(&steps, dinner_time())
        .unwrap();

    for step in &steps {
        let scheduled = schedule.get(step.id.as_str()).unwrap();
        for dep in &step.depends_on {
            let prerequisite = schedule.get(dep.as_str()).unwrap();
            assert!(
                scheduled.start >= prerequisite.end + buffer,
                "{} starts before {} ends",
                step.id,
                dep
            );
        }
    }

    // each critical step after the first sits exactly one buffer after its predecessor
    for pair in schedule.critical_path.windows(2) {
        let before = schedule.get(pair[0].as_str()).unwrap();
        let after = schedule.get(pair[1].as_str()).unwrap();
        assert_eq!(after.start, before.end + buffer);
    }
}

/// Test: Cycle is reported with its members
/// Given A depends on B and B depends on A
/// When validated and scheduled
/// Then validate names the cycle and scheduling fails with CircularDependency
#[test]
fn test_cycle_reported() {
    let graph = TaskGraph::assemble(&cyclic_steps());
    let issues = graph.validate();
    assert_eq!(issues.len(), 1);
    match &issues[0] {
        GraphIssue::Cycle { path } => {
            let members: HashSet<&str> = path.iter().map(|id| id.as_str()).collect();
            assert_eq!(members, HashSet::from(["A", "B"]));
        }
        other => panic!("expected cycle, got {:?}", other),
    }

    let result = ScheduleCalculator::default().schedule(&cyclic_steps(), dinner_time());
    match result {
        Err(Error::CircularDependency { cycles }) => assert!(!cycles.is_empty()),
        other => panic!("expected CircularDependency, got {:?}", other),
    }
}

/// Test: Missing dependency plus a cycle aggregate into InvalidDependencies
#[test]
fn test_mixed_problems_aggregate() {
    let mut steps = cyclic_steps();
    steps.push(Task::new("C", 30.0).depends_on(["ghost"]));

    let err = ScheduleCalculator::default()
        .schedule(&steps, dinner_time())
        .unwrap_err();
    match err {
        Error::InvalidDependencies(issues) => {
            assert!(issues
                .iter()
                .any(|i| matches!(i, GraphIssue::MissingDependency { .. })));
            assert!(issues.iter().any(|i| matches!(i, GraphIssue::Cycle { .. })));
        }
        other => panic!("expected InvalidDependencies, got {:?}", other),
    }
}

#[test]
fn test_empty_recipe_rejected() {
    let result = ScheduleCalculator::default().schedule(&[], dinner_time());
    assert!(matches!(result, Err(Error::NoTasks)));
}

/// Test: Topological order is a valid permutation
#[test]
fn test_topological_order_is_permutation() {
    let steps = diamond_steps();
    let graph = assert_ok!(TaskGraph::build(&steps));
    let order = graph.topological_ids().unwrap();

    let expected: HashSet<TaskId> = steps.iter().map(|t| t.id.clone()).collect();
    let actual: HashSet<TaskId> = order.iter().cloned().collect();
    assert_eq!(actual, expected);

    let position = |id: &TaskId| order.iter().position(|o| o == id).unwrap();
    for step in &steps {
        for dep in &step.depends_on {
            assert!(position(dep) < position(&step.id));
        }
    }
}

/// Test: Critical path duration is the longest root-to-leaf sum
#[test]
fn test_critical_duration_is_longest_path() {
    let graph = TaskGraph::build(&diamond_steps()).unwrap();
    assert_eq!(graph.critical_path_duration(), secs(300 + 420 + 1800));
}

/// Test: Independent steps all end at the target
#[test]
fn test_independent_steps_share_anchor() {
    let schedule = ScheduleCalculator::default()
        .schedule(&independent_steps(3, 120.0), dinner_time())
        .unwrap();
    for scheduled in &schedule.tasks {
        assert_eq!(scheduled.end, dinner_time());
    }
    let groups = schedule.parallel_groups(secs(60));
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
}

/// Test: Same inputs, same schedule
#[test]
fn test_scheduling_is_deterministic() {
    let calculator = ScheduleCalculator::default();
    let first = calculator.schedule(&diamond_steps(), dinner_time()).unwrap();
    let second = calculator.schedule(&diamond_steps(), dinner_time()).unwrap();
    assert_eq!(first, second);
}

/// Test: Timeline pairs every start with an end
#[test]
fn test_timeline_covers_every_step() {
    let schedule = ScheduleCalculator::default()
        .schedule(&diamond_steps(), dinner_time())
        .unwrap();
    let timeline = schedule.timeline();
    assert_eq!(timeline.len(), schedule.len() * 2);
    assert!(timeline.windows(2).all(|w| w[0].at <= w[1].at));
    assert_eq!(timeline.last().unwrap().at, dinner_time());
}

/// Test: Past targets are still scheduled, and flagged
#[test]
fn test_past_target_still_scheduled() {
    let target = dinner_time();
    let now = target + TimeDelta::hours(1);
    let schedule = ScheduleCalculator::default()
        .schedule(&chain_steps(), target)
        .unwrap();
    assert!(schedule.is_target_in_past(now));
    assert!(matches!(
        ScheduleCalculator::check_target(target, now),
        Err(Error::TargetTimeInPast { .. })
    ));
}

/// Test: Absurd durations are rejected, not crashed on
/// Given two chained steps of 1e15 s each
/// When scheduled
/// Then the calculator reports ScheduleOutOfRange
#[test]
fn test_out_of_range_recipe_rejected() {
    let steps = vec![
        Task::new("age", 1e15),
        Task::new("serve", 1e15).depends_on(["age"]),
    ];
    let result = std::panic::catch_unwind(|| {
        ScheduleCalculator::new(TimeDelta::zero()).schedule(&steps, dinner_time())
    });
    let result = result.expect("scheduling must not panic");
    assert!(matches!(result, Err(Error::ScheduleOutOfRange(_))));
}
