//! Read-only projections of timer state for presentation layers.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::schedule::delta_secs;
use crate::core::task::{StepCategory, TaskId};
use crate::orchestration::events::ScheduleId;
use crate::orchestration::timer::{TimerState, TimerStateMachine};

/// Snapshot of a single timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerView {
    pub id: TaskId,
    pub name: String,
    pub category: StepCategory,
    pub parallel: bool,
    pub state: TimerState,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub actual_start: Option<DateTime<Utc>>,
    #[serde(with = "delta_secs")]
    pub remaining: TimeDelta,
    pub progress: f64,
}

impl TimerView {
    pub fn from_machine(machine: &TimerStateMachine) -> Self {
        let scheduled = machine.scheduled();
        Self {
            id: scheduled.task.id.clone(),
            name: scheduled.task.display_name().to_string(),
            category: scheduled.task.category,
            parallel: scheduled.task.parallel,
            state: machine.state(),
            scheduled_start: scheduled.start,
            scheduled_end: scheduled.end,
            actual_start: machine.actual_start(),
            remaining: machine.remaining(),
            progress: machine.progress(),
        }
    }

    pub fn remaining_secs(&self) -> f64 {
        self.remaining.num_milliseconds() as f64 / 1000.0
    }

    /// Short human-readable status.
    pub fn status_line(&self) -> String {
        match self.state {
            TimerState::Ready => "Ready".to_string(),
            TimerState::Running => format!("{} remaining", format_clock(self.remaining)),
            TimerState::Paused => format!("Paused · {} left", format_clock(self.remaining)),
            TimerState::Completed => "Done".to_string(),
            TimerState::Cancelled => "Cancelled".to_string(),
        }
    }
}

/// `MM:SS`, or `H:MM:SS` from one hour up. Partial seconds round up so a
/// countdown never shows 00:00 while time is left.
pub fn format_clock(delta: TimeDelta) -> String {
    let millis = delta.num_milliseconds().max(0);
    let total = (millis + 999) / 1000;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Snapshot of every timer in the loaded schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSnapshot {
    pub schedule_id: Option<ScheduleId>,
    pub target: Option<DateTime<Utc>>,
    pub active: bool,
    /// Timers still waiting for auto-start.
    pub pending: Vec<TaskId>,
    /// Timers in schedule order.
    pub timers: Vec<TimerView>,
}

impl OrchestratorSnapshot {
    pub fn get(&self, id: &str) -> Option<&TimerView> {
        self.timers.iter().find(|t| t.id.as_str() == id)
    }

    pub fn by_state(&self) -> BTreeMap<TimerState, Vec<&TimerView>> {
        let mut groups: BTreeMap<TimerState, Vec<&TimerView>> = BTreeMap::new();
        for view in &self.timers {
            groups.entry(view.state).or_default().push(view);
        }
        groups
    }

    fn in_state(&self, state: TimerState) -> Vec<&TimerView> {
        self.timers.iter().filter(|t| t.state == state).collect()
    }

    /// Ready timers, soonest first.
    pub fn upcoming(&self) -> Vec<&TimerView> {
        let mut ready = self.in_state(TimerState::Ready);
        ready.sort_by_key(|t| t.scheduled_start);
        ready
    }

    pub fn active(&self) -> Vec<&TimerView> {
        self.in_state(TimerState::Running)
    }

    pub fn paused(&self) -> Vec<&TimerView> {
        self.in_state(TimerState::Paused)
    }

    pub fn completed(&self) -> Vec<&TimerView> {
        self.in_state(TimerState::Completed)
    }

    pub fn cancelled(&self) -> Vec<&TimerView> {
        self.in_state(TimerState::Cancelled)
    }

    /// Completed timers over all timers; zero when nothing is loaded.
    pub fn overall_progress(&self) -> f64 {
        if self.timers.is_empty() {
            return 0.0;
        }
        self.completed().len() as f64 / self.timers.len() as f64
    }
}
