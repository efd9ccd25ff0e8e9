//! Events published by the orchestrator.
//!
//! Presentation layers subscribe to these instead of polling timer state.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::task::TaskId;
use crate::orchestration::timer::{TimerState, Transition};

/// Identity of one loaded schedule.
///
/// A fresh id is minted on every load so subscribers can drop events that
/// belong to a schedule that has since been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub Uuid);

impl ScheduleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A new schedule replaced whatever was loaded before.
    ScheduleLoaded { schedule_id: ScheduleId, timers: usize },
    /// Auto-start polling began.
    Activated { schedule_id: ScheduleId },
    /// Auto-start polling stopped.
    Deactivated { schedule_id: ScheduleId },
    /// The poll pass started a timer because its start time arrived.
    AutoStarted {
        schedule_id: ScheduleId,
        task_id: TaskId,
    },
    /// A timer changed state.
    TimerStateChanged {
        schedule_id: ScheduleId,
        task_id: TaskId,
        from: TimerState,
        to: TimerState,
    },
    /// A running timer counted down.
    TimerTicked {
        schedule_id: ScheduleId,
        task_id: TaskId,
        remaining: TimeDelta,
        progress: f64,
    },
    /// Every timer is completed or cancelled and nothing is pending.
    AllTimersFinished { schedule_id: ScheduleId },
}

impl OrchestratorEvent {
    pub fn state_changed(schedule_id: ScheduleId, task_id: &TaskId, transition: Transition) -> Self {
        Self::TimerStateChanged {
            schedule_id,
            task_id: task_id.clone(),
            from: transition.from,
            to: transition.to,
        }
    }

    pub fn schedule_id(&self) -> ScheduleId {
        match self {
            Self::ScheduleLoaded { schedule_id, .. }
            | Self::Activated { schedule_id }
            | Self::Deactivated { schedule_id }
            | Self::AutoStarted { schedule_id, .. }
            | Self::TimerStateChanged { schedule_id, .. }
            | Self::TimerTicked { schedule_id, .. }
            | Self::AllTimersFinished { schedule_id } => *schedule_id,
        }
    }

    /// The timer this event is about, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::AutoStarted { task_id, .. }
            | Self::TimerStateChanged { task_id, .. }
            | Self::TimerTicked { task_id, .. } => Some(task_id),
            _ => None,
        }
    }
}
