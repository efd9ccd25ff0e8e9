//! Live timer orchestration tests.
//!
//! These tests verify auto-start, bulk and per-timer controls, and that
//! timers stop ticking the moment they are paused or cancelled.

use std::time::Duration;

use chrono::TimeDelta;

use mise::core::{Task, TaskId};
use mise::orchestration::{OrchestratorEvent, TimerState};
use mise::Error;
use tokio_test::{assert_err, assert_ok};

use crate::fixtures::{
    base_time, chain_steps, cyclic_steps, diamond_steps, independent_steps, secs,
    OrchestratorHarness,
};

fn boil_and_drain() -> Vec<Task> {
    vec![
        Task::new("boil", 5.0),
        Task::new("drain", 2.0).depends_on(["boil"]),
    ]
}

/// Test: Overdue timers start on the first poll pass
/// Given two steps whose start times are already in the past
/// When start_all is called
/// Then both are running without further intervention
#[tokio::test(start_paused = true)]
async fn test_overdue_timers_start_immediately() {
    let harness = OrchestratorHarness::new();
    harness
        .orchestrator
        .load_schedule(chain_steps(), base_time() - TimeDelta::hours(1))
        .await
        .unwrap();

    harness.orchestrator.start_all().await.unwrap();

    let snapshot = harness.orchestrator.snapshot().await;
    assert_eq!(snapshot.active().len(), 2);
    assert!(snapshot.pending.is_empty());
    harness.orchestrator.shutdown().await;
}

/// Test: Whole recipe runs to completion on its own
/// Given boil (5 s) then drain (2 s) finishing 7 s from now
/// When start_all is called and time passes
/// Then drain auto-starts when boil ends and the orchestrator deactivates
#[tokio::test(start_paused = true)]
async fn test_recipe_runs_to_completion() {
    let mut harness = OrchestratorHarness::new();
    let schedule_id = assert_ok!(
        harness
            .orchestrator
            .load_schedule(boil_and_drain(), base_time() + secs(7))
            .await
    );
    assert_ok!(harness.orchestrator.start_all().await);

    assert_eq!(
        harness.orchestrator.pending_ids().await,
        vec![TaskId::from("drain")]
    );

    harness.run_for(Duration::from_secs(10)).await;

    let snapshot = harness.orchestrator.snapshot().await;
    assert_eq!(snapshot.completed().len(), 2);
    assert_eq!(snapshot.overall_progress(), 1.0);
    assert!(!harness.orchestrator.is_active().await);

    let events = harness.drain_events();
    let auto_started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            OrchestratorEvent::AutoStarted { task_id, .. } => Some(task_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(auto_started, vec!["boil", "drain"]);
    assert!(events
        .iter()
        .any(|e| *e == OrchestratorEvent::AllTimersFinished { schedule_id }));
    assert!(events
        .iter()
        .any(|e| *e == OrchestratorEvent::Deactivated { schedule_id }));
}

/// Test: Each timer completes exactly once
#[tokio::test(start_paused = true)]
async fn test_single_completion_per_timer() {
    let mut harness = OrchestratorHarness::new();
    harness
        .orchestrator
        .load_schedule(independent_steps(3, 4.0), base_time() + secs(4))
        .await
        .unwrap();
    harness.orchestrator.start_all().await.unwrap();
    harness.run_for(Duration::from_secs(8)).await;

    let completions = harness
        .drain_events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                OrchestratorEvent::TimerStateChanged {
                    to: TimerState::Completed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(completions, 3);
}

/// Test: Pause all freezes, resume all continues
/// Given two running 60 s timers
/// When paused after 10 s and resumed 100 s later
/// Then they keep 50 s remaining while paused and finish 50 s after resuming
#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_all() {
    let harness = OrchestratorHarness::new();
    harness
        .orchestrator
        .load_schedule(independent_steps(2, 60.0), base_time() + secs(60))
        .await
        .unwrap();
    harness.orchestrator.start_all().await.unwrap();

    harness.run_for(Duration::from_secs(10)).await;
    assert_eq!(harness.orchestrator.pause_all().await, 2);
    assert_eq!(harness.orchestrator.pause_all().await, 0);

    harness.run_for(Duration::from_secs(100)).await;
    let snapshot = harness.orchestrator.snapshot().await;
    assert_eq!(snapshot.paused().len(), 2);
    for view in &snapshot.timers {
        assert_eq!(view.remaining, secs(50));
        assert_eq!(view.status_line(), "Paused · 00:50 left");
    }
    // still active: paused timers are not finished
    assert!(harness.orchestrator.is_active().await);

    assert_eq!(harness.orchestrator.resume_all().await, 2);
    harness.run_for(Duration::from_secs(45)).await;
    assert_eq!(harness.orchestrator.snapshot().await.active().len(), 2);

    harness.run_for(Duration::from_secs(7)).await;
    assert_eq!(harness.orchestrator.overall_progress().await, 1.0);
}

/// Test: Cancelled timers never tick again
#[tokio::test(start_paused = true)]
async fn test_cancel_all_stops_ticks() {
    let mut harness = OrchestratorHarness::new();
    harness
        .orchestrator
        .load_schedule(independent_steps(2, 30.0), base_time() + secs(30))
        .await
        .unwrap();
    harness.orchestrator.start_all().await.unwrap();
    harness.run_for(Duration::from_secs(3)).await;

    assert_eq!(harness.orchestrator.cancel_all().await, 2);
    assert!(!harness.orchestrator.is_active().await);
    harness.drain_events();

    harness.run_for(Duration::from_secs(60)).await;
    assert!(harness.drain_events().is_empty());
    assert_eq!(harness.orchestrator.snapshot().await.cancelled().len(), 2);
    assert_eq!(harness.notifier.clear_count(), 1);
}

/// Test: Per-timer controls
#[tokio::test(start_paused = true)]
async fn test_per_timer_controls() {
    let harness = OrchestratorHarness::new();
    let orch = &harness.orchestrator;
    orch.load_schedule(chain_steps(), base_time() + TimeDelta::hours(1))
        .await
        .unwrap();

    // task2 is not due for a long while; start it by hand
    assert!(orch.start_now("task2").await);
    assert!(!orch.pending_ids().await.contains(&TaskId::from("task2")));

    assert!(orch.pause("task2").await);
    assert!(!orch.pause("task2").await);
    assert!(orch.resume("task2").await);
    assert!(orch.cancel("task2").await);
    assert!(!orch.resume("task2").await);

    let view = orch.timer_view("task2").await.unwrap();
    assert_eq!(view.state, TimerState::Cancelled);
    assert_eq!(orch.timer_view("task1").await.unwrap().state, TimerState::Ready);
    assert!(!orch.start_now("nope").await);
}

/// Test: start_all with nothing loaded
#[tokio::test(start_paused = true)]
async fn test_start_all_without_schedule() {
    let harness = OrchestratorHarness::new();
    let err = assert_err!(harness.orchestrator.start_all().await);
    assert!(matches!(err, Error::NoTimers));
}

/// Test: Reset then reload reproduces the same start times
#[tokio::test(start_paused = true)]
async fn test_reset_then_reload_is_idempotent() {
    let harness = OrchestratorHarness::with_buffer(secs(30));
    let orch = &harness.orchestrator;
    let target = base_time() + TimeDelta::hours(1);

    orch.load_schedule(diamond_steps(), target).await.unwrap();
    let before = orch.schedule().await.unwrap().start_times();
    orch.start_all().await.unwrap();
    harness.run_for(Duration::from_secs(30)).await;

    orch.reset_all().await;
    let snapshot = orch.snapshot().await;
    assert!(snapshot.pending.is_empty());
    assert!(!snapshot.active);
    assert!(snapshot.timers.iter().all(|t| t.state == TimerState::Ready));

    orch.load_schedule(diamond_steps(), target).await.unwrap();
    let after = orch.schedule().await.unwrap().start_times();
    assert_eq!(before, after);
    assert_eq!(orch.pending_ids().await.len(), 4);
}

/// Test: A rejected schedule leaves running timers alone
#[tokio::test(start_paused = true)]
async fn test_rejected_schedule_keeps_running_timers() {
    let harness = OrchestratorHarness::new();
    let orch = &harness.orchestrator;
    let schedule_id = orch
        .load_schedule(independent_steps(1, 600.0), base_time() + secs(600))
        .await
        .unwrap();
    orch.start_all().await.unwrap();

    let result = orch
        .load_schedule(cyclic_steps(), base_time() + secs(600))
        .await;
    assert!(matches!(result, Err(Error::CircularDependency { .. })));

    let snapshot = orch.snapshot().await;
    assert_eq!(snapshot.schedule_id, Some(schedule_id));
    assert!(snapshot.active);
    assert_eq!(snapshot.active().len(), 1);
    orch.shutdown().await;
}

/// Test: Moving the target re-derives start times and drops progress
#[tokio::test(start_paused = true)]
async fn test_update_target_time() {
    let harness = OrchestratorHarness::new();
    let orch = &harness.orchestrator;
    let first = orch
        .load_schedule(chain_steps(), base_time() + secs(900))
        .await
        .unwrap();
    orch.start_all().await.unwrap();
    harness.run_for(Duration::from_secs(5)).await;

    let later = base_time() + TimeDelta::hours(2);
    let second = orch.update_target_time(later).await.unwrap();
    assert_ne!(first, second);

    let snapshot = orch.snapshot().await;
    assert!(!snapshot.active);
    assert_eq!(snapshot.target, Some(later));
    assert!(snapshot.timers.iter().all(|t| t.state == TimerState::Ready));
    assert_eq!(snapshot.get("task2").unwrap().scheduled_start, later - secs(600));
    assert_eq!(snapshot.pending.len(), 2);
}

/// Test: Start reminders are handed over when auto-start is armed
#[tokio::test(start_paused = true)]
async fn test_notifier_receives_every_start() {
    let harness = OrchestratorHarness::new();
    let orch = &harness.orchestrator;
    let target = base_time() + TimeDelta::hours(1);
    orch.load_schedule(diamond_steps(), target).await.unwrap();
    assert!(harness.notifier.notices().is_empty());

    orch.start_all().await.unwrap();
    let notices = harness.notifier.notices();
    assert_eq!(notices.len(), 4);

    let schedule = orch.schedule().await.unwrap();
    for notice in &notices {
        let scheduled = schedule.get(notice.task_id.as_str()).unwrap();
        assert_eq!(notice.scheduled_start, scheduled.start);
    }
    let bake = notices.iter().find(|n| n.task_id.as_str() == "bake").unwrap();
    assert_eq!(bake.name, "Bake");
    orch.shutdown().await;
}

/// Test: Upcoming timers are ordered by start time
#[tokio::test(start_paused = true)]
async fn test_upcoming_order() {
    let harness = OrchestratorHarness::new();
    harness
        .orchestrator
        .load_schedule(diamond_steps(), base_time() + TimeDelta::hours(1))
        .await
        .unwrap();

    let snapshot = harness.orchestrator.snapshot().await;
    let upcoming: Vec<&str> = snapshot.upcoming().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(upcoming, vec!["preheat", "chop", "saute", "bake"]);
    assert_eq!(harness.orchestrator.timeline().await.len(), 8);
}

/// Test: Events carry the schedule they belong to
#[tokio::test(start_paused = true)]
async fn test_events_tagged_with_schedule() {
    let mut harness = OrchestratorHarness::new();
    let schedule_id = harness
        .orchestrator
        .load_schedule(chain_steps(), base_time() - secs(1))
        .await
        .unwrap();

    let loaded = harness.next_event_timeout(100).await.unwrap();
    assert_eq!(
        loaded,
        OrchestratorEvent::ScheduleLoaded {
            schedule_id,
            timers: 2
        }
    );

    harness.orchestrator.start_all().await.unwrap();
    let activated = harness.next_event_timeout(100).await.unwrap();
    assert_eq!(activated, OrchestratorEvent::Activated { schedule_id });

    for event in harness.drain_events() {
        assert_eq!(event.schedule_id(), schedule_id);
    }
    harness.orchestrator.shutdown().await;
}
