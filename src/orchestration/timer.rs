//! Per-step countdown state machine.
//!
//! `TimerStateMachine` is the synchronous heart of a timer: it knows its
//! state, how much time has run, and which transitions are legal. It never
//! reads the clock itself; callers pass `now`. The periodic tick source that
//! drives it lives in [`crate::actors::ticker`].

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::core::schedule::ScheduledTask;
use crate::core::task::TaskId;

/// Timer lifecycle.
///
/// ```text
/// Ready --start--> Running --pause--> Paused --resume--> Running
///   |                 |                  |
///   +-----cancel------+------cancel------+--> Cancelled
///                     +--tick(remaining = 0)--> Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    Ready,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl TimerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TimerState::Completed | TimerState::Cancelled)
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::Ready
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerState::Ready => write!(f, "ready"),
            TimerState::Running => write!(f, "running"),
            TimerState::Paused => write!(f, "paused"),
            TimerState::Completed => write!(f, "completed"),
            TimerState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A state change that actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TimerState,
    pub to: TimerState,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The timer was not running; nothing changed.
    Idle,
    /// Still counting down.
    Progress { remaining: TimeDelta, progress: f64 },
    /// Reached zero on this tick.
    Completed(Transition),
}

/// Countdown for one scheduled step.
#[derive(Debug, Clone)]
pub struct TimerStateMachine {
    task: ScheduledTask,
    state: TimerState,
    /// First time the timer was started; cleared by reset.
    actual_start: Option<DateTime<Utc>>,
    /// Start of the current running stretch.
    resumed_at: Option<DateTime<Utc>>,
    /// Running time banked before the current stretch.
    banked: TimeDelta,
    remaining: TimeDelta,
    progress: f64,
}

impl TimerStateMachine {
    pub fn new(task: ScheduledTask) -> Self {
        let remaining = task.task.duration();
        Self {
            task,
            state: TimerState::Ready,
            actual_start: None,
            resumed_at: None,
            banked: TimeDelta::zero(),
            remaining,
            progress: 0.0,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.task.task.id
    }

    pub fn scheduled(&self) -> &ScheduledTask {
        &self.task
    }

    pub fn scheduled_start(&self) -> DateTime<Utc> {
        self.task.start
    }

    pub fn duration(&self) -> TimeDelta {
        self.task.task.duration()
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn actual_start(&self) -> Option<DateTime<Utc>> {
        self.actual_start
    }

    pub fn remaining(&self) -> TimeDelta {
        self.remaining
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    // ========== Predicates ==========

    pub fn can_start(&self) -> bool {
        matches!(self.state, TimerState::Ready | TimerState::Paused)
    }

    pub fn can_pause(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn can_resume(&self) -> bool {
        self.state == TimerState::Paused
    }

    pub fn can_cancel(&self) -> bool {
        !self.state.is_terminal()
    }

    // ========== Transitions ==========

    /// Start counting down. From `Paused` this behaves like [`resume`].
    ///
    /// [`resume`]: TimerStateMachine::resume
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        match self.state {
            TimerState::Ready => {
                self.actual_start = Some(now);
                self.resumed_at = Some(now);
                self.banked = TimeDelta::zero();
                Some(self.move_to(TimerState::Running))
            }
            TimerState::Paused => self.resume(now),
            _ => None,
        }
    }

    /// Freeze remaining time and progress.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        if !self.can_pause() {
            return None;
        }
        self.measure(now);
        self.banked = self.elapsed(now);
        self.resumed_at = None;
        Some(self.move_to(TimerState::Paused))
    }

    /// Continue from where the timer was paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        if !self.can_resume() {
            return None;
        }
        self.resumed_at = Some(now);
        Some(self.move_to(TimerState::Running))
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        if !self.can_cancel() {
            return None;
        }
        if self.state == TimerState::Running {
            self.measure(now);
            self.banked = self.elapsed(now);
        }
        self.resumed_at = None;
        Some(self.move_to(TimerState::Cancelled))
    }

    /// Back to a fresh `Ready` timer with full remaining time.
    pub fn reset(&mut self) -> Option<Transition> {
        let from = self.state;
        self.actual_start = None;
        self.resumed_at = None;
        self.banked = TimeDelta::zero();
        self.remaining = self.duration();
        self.progress = 0.0;
        self.state = TimerState::Ready;
        (from != TimerState::Ready).then_some(Transition {
            from,
            to: TimerState::Ready,
        })
    }

    /// Recompute remaining time and progress; completes at zero.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.state != TimerState::Running {
            return TickOutcome::Idle;
        }
        self.measure(now);
        if self.remaining <= TimeDelta::zero() {
            self.resumed_at = None;
            self.banked = self.duration();
            return TickOutcome::Completed(self.move_to(TimerState::Completed));
        }
        TickOutcome::Progress {
            remaining: self.remaining,
            progress: self.progress,
        }
    }

    /// Running time, excluding paused stretches.
    fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        let current = match self.resumed_at {
            Some(since) => (now - since).max(TimeDelta::zero()),
            None => TimeDelta::zero(),
        };
        self.banked + current
    }

    fn measure(&mut self, now: DateTime<Utc>) {
        let elapsed = self.elapsed(now);
        let duration = self.duration();
        self.remaining = (duration - elapsed).max(TimeDelta::zero());
        self.progress = if duration <= TimeDelta::zero() {
            1.0
        } else {
            let ratio = elapsed.num_milliseconds() as f64 / duration.num_milliseconds() as f64;
            ratio.clamp(0.0, 1.0)
        };
    }

    fn move_to(&mut self, to: TimerState) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to }
    }
}
