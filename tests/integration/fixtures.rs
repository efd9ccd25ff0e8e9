//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Predefined step sets (chain, diamond, cycle)
//! - An orchestrator wired to tokio's virtual clock
//! - A notifier that records what it was handed

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use mise::clock::TokioClock;
use mise::core::{StepCategory, Task};
use mise::orchestration::{
    OrchestratorConfig, OrchestratorEvent, StartNotice, StartNotifier, TimerOrchestrator,
};

/// 17:00 UTC on a fixed day; harness clocks start here.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 17, 0, 0).unwrap()
}

/// 18:00 UTC on the same day.
pub fn dinner_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 18, 0, 0).unwrap()
}

pub fn secs(n: i64) -> TimeDelta {
    TimeDelta::seconds(n)
}

/// task1 (300 s) then task2 (600 s).
pub fn chain_steps() -> Vec<Task> {
    vec![
        Task::new("task1", 300.0),
        Task::new("task2", 600.0).depends_on(["task1"]),
    ]
}

/// Diamond from the dinner example:
///
/// ```text
///   preheat ---------\
///                     bake
///   chop --> saute --/
/// ```
pub fn diamond_steps() -> Vec<Task> {
    vec![
        Task::new("preheat", 600.0)
            .with_name("Preheat oven")
            .parallel(true)
            .category(StepCategory::Bake),
        Task::new("chop", 300.0)
            .with_name("Chop vegetables")
            .category(StepCategory::Prep),
        Task::new("saute", 420.0)
            .with_name("Sauté")
            .depends_on(["chop"])
            .category(StepCategory::Cook),
        Task::new("bake", 1800.0)
            .with_name("Bake")
            .depends_on(["preheat", "saute"])
            .category(StepCategory::Bake),
    ]
}

/// A depends on B, B depends on A.
pub fn cyclic_steps() -> Vec<Task> {
    vec![
        Task::new("A", 60.0).depends_on(["B"]),
        Task::new("B", 60.0).depends_on(["A"]),
    ]
}

/// Independent steps named `step-0`, `step-1`, ...
pub fn independent_steps(count: usize, duration: f64) -> Vec<Task> {
    (0..count)
        .map(|i| Task::new(format!("step-{}", i).as_str(), duration).parallel(true))
        .collect()
}

/// Notifier that keeps every notice it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<StartNotice>>,
    pub clears: Mutex<usize>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<StartNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn clear_count(&self) -> usize {
        *self.clears.lock().unwrap()
    }
}

impl StartNotifier for RecordingNotifier {
    fn schedule(&self, notices: &[StartNotice]) {
        self.notices.lock().unwrap().extend_from_slice(notices);
    }

    fn clear(&self) {
        *self.clears.lock().unwrap() += 1;
    }
}

/// Test harness for orchestrator tests.
///
/// Runs on tokio's clock, so tests using `start_paused = true` can jump
/// through a whole recipe instantly.
pub struct OrchestratorHarness {
    pub orchestrator: TimerOrchestrator,
    pub events: broadcast::Receiver<OrchestratorEvent>,
    pub notifier: Arc<RecordingNotifier>,
}

impl OrchestratorHarness {
    /// Harness with no inter-step buffer.
    pub fn new() -> Self {
        Self::with_buffer(TimeDelta::zero())
    }

    pub fn with_buffer(buffer: TimeDelta) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        let config = OrchestratorConfig {
            buffer,
            ..OrchestratorConfig::default()
        };
        let orchestrator = TimerOrchestrator::new(config)
            .with_clock(Arc::new(TokioClock::new(base_time())))
            .with_notifier(notifier.clone());
        let events = orchestrator.subscribe();
        Self {
            orchestrator,
            events,
            notifier,
        }
    }

    /// Drain every event still buffered. Events lost to lag are skipped.
    pub fn drain_events(&mut self) -> Vec<OrchestratorEvent> {
        let mut drained = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => drained.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        drained
    }

    /// Wait for the next event, up to `timeout_ms` of virtual time.
    pub async fn next_event_timeout(&mut self, timeout_ms: u64) -> Option<OrchestratorEvent> {
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.events.recv())
            .await
            .ok()
            .and_then(|event| event.ok())
    }

    /// Let `duration` of virtual time pass with actors running.
    pub async fn run_for(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diamond_steps_shape() {
        let steps = diamond_steps();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[3].depends_on.len(), 2);
    }

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::default();
        notifier.schedule(&[StartNotice {
            task_id: "a".into(),
            name: "A".to_string(),
            scheduled_start: base_time(),
        }]);
        notifier.clear();
        assert_eq!(notifier.notices().len(), 1);
        assert_eq!(notifier.clear_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_harness_starts_empty() {
        let harness = OrchestratorHarness::new();
        let snapshot = harness.orchestrator.snapshot().await;
        assert!(snapshot.timers.is_empty());
        assert!(!snapshot.active);
    }
}
