//! Shared, async handle to one timer.
//!
//! A `TimerHandle` pairs a [`TimerStateMachine`] with the ticker that drives
//! it. Both live in one mutex-guarded cell. Transitions arm or stop the
//! ticker while holding the lock, and the ticker re-checks its cancellation
//! token after taking the lock, so no tick lands after a pause or cancel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::actors::{ActorHandle, TimerTicker};
use crate::clock::Clock;
use crate::core::task::TaskId;
use crate::orchestration::events::{OrchestratorEvent, ScheduleId};
use crate::orchestration::timer::{TickOutcome, TimerState, TimerStateMachine, Transition};
use crate::orchestration::view::TimerView;

struct TimerCell {
    machine: TimerStateMachine,
    ticker: Option<ActorHandle>,
}

impl TimerCell {
    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.shutdown();
        }
    }
}

#[derive(Clone)]
pub struct TimerHandle {
    id: TaskId,
    scheduled_start: DateTime<Utc>,
    schedule_id: ScheduleId,
    cell: Arc<Mutex<TimerCell>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<OrchestratorEvent>,
    tick_interval: Duration,
}

impl TimerHandle {
    pub fn new(
        machine: TimerStateMachine,
        schedule_id: ScheduleId,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<OrchestratorEvent>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            id: machine.id().clone(),
            scheduled_start: machine.scheduled_start(),
            schedule_id,
            cell: Arc::new(Mutex::new(TimerCell {
                machine,
                ticker: None,
            })),
            clock,
            events,
            tick_interval,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn scheduled_start(&self) -> DateTime<Utc> {
        self.scheduled_start
    }

    pub async fn state(&self) -> TimerState {
        self.cell.lock().await.machine.state()
    }

    pub async fn view(&self) -> TimerView {
        TimerView::from_machine(&self.cell.lock().await.machine)
    }

    /// Start from `Ready`, or continue from `Paused`.
    pub async fn start(&self) -> bool {
        let mut cell = self.cell.lock().await;
        let transition = cell.machine.start(self.clock.now());
        self.after_run(&mut cell, transition)
    }

    pub async fn resume(&self) -> bool {
        let mut cell = self.cell.lock().await;
        let transition = cell.machine.resume(self.clock.now());
        self.after_run(&mut cell, transition)
    }

    pub async fn pause(&self) -> bool {
        let mut cell = self.cell.lock().await;
        let transition = cell.machine.pause(self.clock.now());
        self.after_stop(&mut cell, transition)
    }

    pub async fn cancel(&self) -> bool {
        let mut cell = self.cell.lock().await;
        let transition = cell.machine.cancel(self.clock.now());
        self.after_stop(&mut cell, transition)
    }

    pub async fn reset(&self) -> bool {
        let mut cell = self.cell.lock().await;
        cell.stop_ticker();
        let transition = cell.machine.reset();
        self.report(transition)
    }

    /// Stop the ticker without changing state.
    pub async fn shutdown(&self) {
        self.cell.lock().await.stop_ticker();
    }

    /// One countdown step, driven by [`TimerTicker`]. Returns whether the
    /// ticker should keep running.
    pub(crate) async fn tick(&self, cancel: &CancellationToken) -> bool {
        let mut cell = self.cell.lock().await;
        if cancel.is_cancelled() {
            return false;
        }
        match cell.machine.tick(self.clock.now()) {
            TickOutcome::Idle => false,
            TickOutcome::Progress {
                remaining,
                progress,
            } => {
                let _ = self.events.send(OrchestratorEvent::TimerTicked {
                    schedule_id: self.schedule_id,
                    task_id: self.id.clone(),
                    remaining,
                    progress,
                });
                true
            }
            TickOutcome::Completed(transition) => {
                cell.ticker = None;
                info!(task = %self.id, "timer completed");
                self.report(Some(transition));
                false
            }
        }
    }

    fn after_run(&self, cell: &mut TimerCell, transition: Option<Transition>) -> bool {
        if transition.is_some() {
            cell.stop_ticker();
            let ticker = TimerTicker::new(self.clone())
                .with_interval(self.tick_interval)
                .spawn();
            cell.ticker = Some(ticker);
        }
        self.report(transition)
    }

    fn after_stop(&self, cell: &mut TimerCell, transition: Option<Transition>) -> bool {
        if transition.is_some() {
            cell.stop_ticker();
        }
        self.report(transition)
    }

    fn report(&self, transition: Option<Transition>) -> bool {
        match transition {
            Some(transition) => {
                debug!(task = %self.id, from = %transition.from, to = %transition.to, "timer transition");
                let _ = self.events.send(OrchestratorEvent::state_changed(
                    self.schedule_id,
                    &self.id,
                    transition,
                ));
                true
            }
            None => {
                debug!(task = %self.id, "transition rejected");
                false
            }
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.id)
            .field("scheduled_start", &self.scheduled_start)
            .field("schedule_id", &self.schedule_id)
            .finish()
    }
}
