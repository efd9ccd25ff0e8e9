//! Timer orchestrator.
//!
//! Owns every timer of the loaded schedule and the auto-start poll. All
//! control operations and poll passes take the same async mutex, so they
//! never interleave. Lock order is orchestrator state, then timer cell.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actors::poller::POLL_INTERVAL;
use crate::actors::ticker::TICK_INTERVAL;
use crate::actors::{ActorHandle, AutoStartPoller};
use crate::clock::{Clock, SystemClock};
use crate::core::schedule::{Schedule, ScheduleCalculator, DEFAULT_BUFFER_SECS};
use crate::core::task::{Task, TaskId};
use crate::core::timeline::{ParallelGroup, TimelineEvent, DEFAULT_GROUP_WINDOW_SECS};
use crate::error::{Error, Result};
use crate::orchestration::events::{OrchestratorEvent, ScheduleId};
use crate::orchestration::handle::TimerHandle;
use crate::orchestration::notify::{LogNotifier, StartNotice, StartNotifier};
use crate::orchestration::timer::TimerStateMachine;
use crate::orchestration::view::{OrchestratorSnapshot, TimerView};

const EVENT_CAPACITY: usize = 256;

/// Tunables for scheduling and the background actors.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Gap between a prerequisite's end and its dependent's start.
    pub buffer: TimeDelta,
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    /// Window for grouping parallel steps in presentation.
    pub group_window: TimeDelta,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            buffer: TimeDelta::seconds(DEFAULT_BUFFER_SECS),
            poll_interval: POLL_INTERVAL,
            tick_interval: TICK_INTERVAL,
            group_window: TimeDelta::seconds(DEFAULT_GROUP_WINDOW_SECS),
        }
    }
}

#[derive(Default)]
struct OrchestratorState {
    schedule_id: Option<ScheduleId>,
    /// Task definitions as loaded, kept for re-targeting.
    definitions: Vec<Task>,
    schedule: Option<Schedule>,
    timers: HashMap<TaskId, TimerHandle>,
    /// Timer ids in schedule order.
    order: Vec<TaskId>,
    pending: HashSet<TaskId>,
    active: bool,
    poller: Option<ActorHandle>,
}

impl OrchestratorState {
    fn handles(&self) -> impl Iterator<Item = &TimerHandle> {
        self.order.iter().filter_map(|id| self.timers.get(id))
    }
}

#[derive(Clone)]
pub struct TimerOrchestrator {
    state: Arc<Mutex<OrchestratorState>>,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    events: broadcast::Sender<OrchestratorEvent>,
    notifier: Arc<dyn StartNotifier>,
}

impl TimerOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(OrchestratorState::default())),
            clock: Arc::new(SystemClock),
            config,
            events,
            notifier: Arc::new(LogNotifier),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn StartNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    // ========== Loading ==========

    /// Schedule `tasks` to finish at `target` and replace the current timers.
    ///
    /// A rejected schedule leaves the previous timers untouched. A target in
    /// the past is logged and scheduled anyway.
    pub async fn load_schedule(&self, tasks: Vec<Task>, target: DateTime<Utc>) -> Result<ScheduleId> {
        let mut state = self.state.lock().await;
        self.load_locked(&mut state, tasks, target).await
    }

    /// Re-derive start times for the loaded task definitions. Timer progress
    /// is discarded.
    pub async fn update_target_time(&self, target: DateTime<Utc>) -> Result<ScheduleId> {
        let mut state = self.state.lock().await;
        let definitions = state.definitions.clone();
        self.load_locked(&mut state, definitions, target).await
    }

    // ========== Bulk controls ==========

    /// Arm auto-start and immediately start every timer already due.
    pub async fn start_all(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.timers.is_empty() {
            return Err(Error::NoTimers);
        }
        let Some(schedule_id) = state.schedule_id else {
            return Err(Error::NoTimers);
        };

        if state.active {
            self.poll_locked(&mut state).await;
            return Ok(());
        }

        state.active = true;
        info!(schedule = %schedule_id.short(), "auto-start armed");
        let _ = self.events.send(OrchestratorEvent::Activated { schedule_id });

        let notices: Vec<StartNotice> = state
            .schedule
            .iter()
            .flat_map(|schedule| schedule.tasks.iter())
            .map(|scheduled| StartNotice {
                task_id: scheduled.id().clone(),
                name: scheduled.task.display_name().to_string(),
                scheduled_start: scheduled.start,
            })
            .collect();
        self.notifier.schedule(&notices);

        self.poll_locked(&mut state).await;
        if state.active {
            let poller = AutoStartPoller::new(self.clone())
                .with_interval(self.config.poll_interval)
                .spawn();
            state.poller = Some(poller);
        }
        Ok(())
    }

    /// Run one auto-start pass now. Returns whether auto-start is still active.
    pub async fn poll_once(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.active {
            return false;
        }
        self.poll_locked(&mut state).await;
        state.active
    }

    /// Poll pass driven by [`AutoStartPoller`]; a no-op once `cancel` fired.
    pub(crate) async fn poll_with(&self, cancel: &CancellationToken) -> bool {
        let mut state = self.state.lock().await;
        if cancel.is_cancelled() || !state.active {
            return false;
        }
        self.poll_locked(&mut state).await;
        state.active
    }

    /// Pause every running timer. Returns how many paused.
    pub async fn pause_all(&self) -> usize {
        let state = self.state.lock().await;
        let mut paused = 0;
        for handle in state.handles() {
            if handle.pause().await {
                paused += 1;
            }
        }
        debug!(paused, "pause all");
        paused
    }

    /// Resume every paused timer. Returns how many resumed.
    pub async fn resume_all(&self) -> usize {
        let state = self.state.lock().await;
        let mut resumed = 0;
        for handle in state.handles() {
            if handle.resume().await {
                resumed += 1;
            }
        }
        debug!(resumed, "resume all");
        resumed
    }

    /// Cancel every live timer and stop auto-start.
    pub async fn cancel_all(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut cancelled = 0;
        for handle in state.handles() {
            if handle.cancel().await {
                cancelled += 1;
            }
        }
        self.deactivate(&mut state);
        self.notifier.clear();
        info!(cancelled, "cancel all");
        cancelled
    }

    /// Return every timer to `Ready`, clear pending auto-starts and stop
    /// auto-start.
    pub async fn reset_all(&self) {
        let mut state = self.state.lock().await;
        for handle in state.handles() {
            handle.reset().await;
        }
        state.pending.clear();
        self.deactivate(&mut state);
        self.notifier.clear();
        info!("reset all");
    }

    // ========== Per-timer controls ==========

    /// Start one timer immediately and take it off the auto-start list.
    pub async fn start_now(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(handle) = state.timers.get(id).cloned() else {
            debug!(task = id, "start_now: unknown timer");
            return false;
        };
        state.pending.remove(id);
        handle.start().await
    }

    pub async fn pause(&self, id: &str) -> bool {
        let state = self.state.lock().await;
        match state.timers.get(id) {
            Some(handle) => handle.pause().await,
            None => false,
        }
    }

    pub async fn resume(&self, id: &str) -> bool {
        let state = self.state.lock().await;
        match state.timers.get(id) {
            Some(handle) => handle.resume().await,
            None => false,
        }
    }

    pub async fn cancel(&self, id: &str) -> bool {
        let state = self.state.lock().await;
        match state.timers.get(id) {
            Some(handle) => handle.cancel().await,
            None => false,
        }
    }

    // ========== Queries ==========

    pub async fn snapshot(&self) -> OrchestratorSnapshot {
        let state = self.state.lock().await;
        let mut timers = Vec::with_capacity(state.order.len());
        for handle in state.handles() {
            timers.push(handle.view().await);
        }
        OrchestratorSnapshot {
            schedule_id: state.schedule_id,
            target: state.schedule.as_ref().map(|s| s.target),
            active: state.active,
            pending: state
                .order
                .iter()
                .filter(|id| state.pending.contains(*id))
                .cloned()
                .collect(),
            timers,
        }
    }

    pub async fn timer_view(&self, id: &str) -> Option<TimerView> {
        let handle = self.state.lock().await.timers.get(id).cloned()?;
        Some(handle.view().await)
    }

    pub async fn overall_progress(&self) -> f64 {
        self.snapshot().await.overall_progress()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    /// Timers still waiting for auto-start, in schedule order.
    pub async fn pending_ids(&self) -> Vec<TaskId> {
        let state = self.state.lock().await;
        state
            .order
            .iter()
            .filter(|id| state.pending.contains(*id))
            .cloned()
            .collect()
    }

    pub async fn schedule(&self) -> Option<Schedule> {
        self.state.lock().await.schedule.clone()
    }

    pub async fn target_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.schedule.as_ref().map(|s| s.target)
    }

    pub async fn timeline(&self) -> Vec<TimelineEvent> {
        self.state
            .lock()
            .await
            .schedule
            .as_ref()
            .map(Schedule::timeline)
            .unwrap_or_default()
    }

    pub async fn parallel_groups(&self) -> Vec<ParallelGroup> {
        let window = self.config.group_window;
        self.state
            .lock()
            .await
            .schedule
            .as_ref()
            .map(|s| s.parallel_groups(window))
            .unwrap_or_default()
    }

    /// Stop every background actor. Timer states are left as they are.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.teardown(&mut state).await;
    }

    // ========== Internals ==========

    async fn poll_locked(&self, state: &mut OrchestratorState) {
        let Some(schedule_id) = state.schedule_id else {
            return;
        };
        let now = self.clock.now();

        let due: Vec<TimerHandle> = state
            .handles()
            .filter(|h| state.pending.contains(h.id()) && h.scheduled_start() <= now)
            .cloned()
            .collect();

        for handle in due {
            state.pending.remove(handle.id());
            if handle.start().await {
                debug!(task = %handle.id(), "auto-started");
                let _ = self.events.send(OrchestratorEvent::AutoStarted {
                    schedule_id,
                    task_id: handle.id().clone(),
                });
            }
        }

        if !state.pending.is_empty() {
            return;
        }
        let mut finished = true;
        for handle in state.handles() {
            if !handle.state().await.is_terminal() {
                finished = false;
                break;
            }
        }
        if finished {
            info!(schedule = %schedule_id.short(), "all timers finished");
            self.deactivate(state);
            let _ = self
                .events
                .send(OrchestratorEvent::AllTimersFinished { schedule_id });
        }
    }

    fn deactivate(&self, state: &mut OrchestratorState) {
        if let Some(poller) = state.poller.take() {
            poller.shutdown();
        }
        if state.active {
            state.active = false;
            if let Some(schedule_id) = state.schedule_id {
                let _ = self.events.send(OrchestratorEvent::Deactivated { schedule_id });
            }
        }
    }

    async fn load_locked(
        &self,
        state: &mut OrchestratorState,
        tasks: Vec<Task>,
        target: DateTime<Utc>,
    ) -> Result<ScheduleId> {
        let calculator = ScheduleCalculator::new(self.config.buffer);
        let schedule = match calculator.schedule(&tasks, target) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!("schedule rejected: {}", e);
                return Err(e);
            }
        };

        let now = self.clock.now();
        if let Err(e) = ScheduleCalculator::check_target(target, now) {
            warn!("{}", e);
        }

        let schedule_id = ScheduleId::new();
        self.teardown(state).await;

        let mut timers = HashMap::with_capacity(schedule.len());
        let mut order = Vec::with_capacity(schedule.len());
        for scheduled in &schedule.tasks {
            let handle = TimerHandle::new(
                TimerStateMachine::new(scheduled.clone()),
                schedule_id,
                Arc::clone(&self.clock),
                self.events.clone(),
                self.config.tick_interval,
            );
            order.push(scheduled.id().clone());
            timers.insert(scheduled.id().clone(), handle);
        }

        info!(
            schedule = %schedule_id.short(),
            timers = order.len(),
            %target,
            "schedule loaded"
        );

        state.pending = order.iter().cloned().collect();
        state.timers = timers;
        state.order = order;
        state.definitions = tasks;
        state.schedule = Some(schedule);
        state.schedule_id = Some(schedule_id);
        state.active = false;

        let _ = self.events.send(OrchestratorEvent::ScheduleLoaded {
            schedule_id,
            timers: state.order.len(),
        });
        Ok(schedule_id)
    }

    async fn teardown(&self, state: &mut OrchestratorState) {
        let was_active = state.active;
        self.deactivate(state);
        if was_active {
            self.notifier.clear();
        }
        for handle in state.handles() {
            handle.shutdown().await;
        }
    }
}

impl std::fmt::Debug for TimerOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerOrchestrator")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish()
    }
}
