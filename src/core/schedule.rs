//! Backward scheduling from a target completion time.
//!
//! The calculator anchors the critical chain so that it ends exactly at the
//! target, then walks the graph forward from that anchor. Steps off the
//! critical chain start as soon as their prerequisites allow, not as late as
//! possible.

use crate::core::dag::{GraphIssue, TaskGraph};
use crate::core::task::{Task, TaskId};
use crate::core::timeline::{self, ParallelGroup, TimelineEvent};
use crate::error::{Error, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Default gap between a prerequisite finishing and its dependent starting.
pub const DEFAULT_BUFFER_SECS: i64 = 30;

/// A task with its derived start and end instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task: Task,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(task: Task, start: DateTime<Utc>) -> Self {
        let end = start
            .checked_add_signed(task.duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { task, start, end }
    }

    pub fn id(&self) -> &TaskId {
        &self.task.id
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// A complete schedule for one target time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// When the critical chain finishes.
    pub target: DateTime<Utc>,
    /// Gap inserted after every prerequisite.
    #[serde(with = "delta_secs")]
    pub buffer: TimeDelta,
    /// Scheduled tasks in topological order.
    pub tasks: Vec<ScheduledTask>,
    /// The critical chain, first task first.
    pub critical_path: Vec<TaskId>,
    /// Length of the critical chain including buffers.
    #[serde(with = "delta_secs")]
    pub critical_duration: TimeDelta,
}

impl Schedule {
    pub fn get(&self, id: &str) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|t| t.task.id.as_str() == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|t| t.start).min()
    }

    pub fn latest_end(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|t| t.end).max()
    }

    pub fn is_critical(&self, id: &str) -> bool {
        self.critical_path.iter().any(|t| t.as_str() == id)
    }

    /// Start instants keyed by task.
    pub fn start_times(&self) -> HashMap<TaskId, DateTime<Utc>> {
        self.tasks
            .iter()
            .map(|t| (t.task.id.clone(), t.start))
            .collect()
    }

    /// Whether the target had already passed at `now`.
    pub fn is_target_in_past(&self, now: DateTime<Utc>) -> bool {
        self.target <= now
    }

    pub fn parallel_groups(&self, window: TimeDelta) -> Vec<ParallelGroup> {
        timeline::group_parallel_steps(&self.tasks, window)
    }

    pub fn timeline(&self) -> Vec<TimelineEvent> {
        timeline::generate_timeline(&self.tasks)
    }
}

/// Computes start times for a task graph.
#[derive(Debug, Clone)]
pub struct ScheduleCalculator {
    buffer: TimeDelta,
}

impl Default for ScheduleCalculator {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(DEFAULT_BUFFER_SECS))
    }
}

impl ScheduleCalculator {
    pub fn new(buffer: TimeDelta) -> Self {
        Self {
            buffer: buffer.max(TimeDelta::zero()),
        }
    }

    pub fn buffer(&self) -> TimeDelta {
        self.buffer
    }

    /// Report whether `target` leaves any time at all.
    ///
    /// Scheduling itself never rejects a past target; this is for callers
    /// that want to flag it.
    pub fn check_target(target: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if target <= now {
            return Err(Error::TargetTimeInPast { target, now });
        }
        Ok(())
    }

    /// Start instant for every task so the critical chain ends at `target`.
    ///
    /// Roots start at `target - critical duration`; every other task starts
    /// `buffer` after its latest-finishing prerequisite.
    ///
    /// # Errors
    /// - `NoTasks` for an empty graph
    /// - `CircularDependency` when the only problems are cycles
    /// - `InvalidDependencies` for any other structural problem
    /// - `ScheduleOutOfRange` when durations or the buffer push a step off
    ///   the calendar
    pub fn compute_start_times(
        graph: &TaskGraph,
        target: DateTime<Utc>,
        buffer: TimeDelta,
    ) -> Result<HashMap<TaskId, DateTime<Utc>>> {
        if graph.is_empty() {
            return Err(Error::NoTasks);
        }

        let issues = graph.validate();
        if !issues.is_empty() {
            return Err(classify(issues));
        }

        let order = graph
            .topological_sort()
            .ok_or(Error::CircularDependency { cycles: Vec::new() })?;

        let (_, critical) = graph.critical_path_with_buffer(buffer);
        let anchor = target.checked_sub_signed(critical).ok_or_else(|| {
            Error::ScheduleOutOfRange(format!(
                "critical chain of {}s cannot end at {}",
                critical.num_seconds(),
                target
            ))
        })?;

        let mut starts: HashMap<TaskId, DateTime<Utc>> = HashMap::with_capacity(order.len());
        let mut ends: HashMap<TaskId, DateTime<Utc>> = HashMap::with_capacity(order.len());
        for task in order {
            let latest_prerequisite_end = graph
                .get_dependencies(task.id.as_str())
                .into_iter()
                .filter_map(|dep| ends.get(&dep.id).copied())
                .max();

            let start = match latest_prerequisite_end {
                Some(end) => end.checked_add_signed(buffer),
                None => Some(anchor),
            };
            let end = start.and_then(|start| start.checked_add_signed(task.duration()));
            let (Some(start), Some(end)) = (start, end) else {
                return Err(Error::ScheduleOutOfRange(format!(
                    "step '{}' runs past the representable calendar",
                    task.id
                )));
            };
            starts.insert(task.id.clone(), start);
            ends.insert(task.id.clone(), end);
        }

        Ok(starts)
    }

    /// Build the full [`Schedule`] for `tasks`.
    pub fn schedule(&self, tasks: &[Task], target: DateTime<Utc>) -> Result<Schedule> {
        let graph = TaskGraph::assemble(tasks);
        self.schedule_graph(&graph, target)
    }

    pub fn schedule_graph(&self, graph: &TaskGraph, target: DateTime<Utc>) -> Result<Schedule> {
        let starts = Self::compute_start_times(graph, target, self.buffer)?;
        let (critical_path, critical_duration) = graph.critical_path_with_buffer(self.buffer);

        let tasks: Vec<ScheduledTask> = graph
            .topological_sort()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|task| {
                starts
                    .get(&task.id)
                    .map(|start| ScheduledTask::new(task.clone(), *start))
            })
            .collect();

        debug!(
            tasks = tasks.len(),
            critical = critical_path.len(),
            critical_secs = critical_duration.num_seconds(),
            %target,
            "schedule computed"
        );

        Ok(Schedule {
            target,
            buffer: self.buffer,
            tasks,
            critical_path,
            critical_duration,
        })
    }
}

/// chrono has no serde support for spans; store them as fractional seconds.
pub(crate) mod delta_secs {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(delta.num_milliseconds() as f64 / 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        TimeDelta::try_milliseconds((secs * 1000.0).round() as i64)
            .ok_or_else(|| serde::de::Error::custom(format!("{} seconds is out of range", secs)))
    }
}

/// Cycles alone become `CircularDependency`; anything else is reported in full.
fn classify(issues: Vec<GraphIssue>) -> Error {
    let only_cycles = issues
        .iter()
        .all(|issue| matches!(issue, GraphIssue::Cycle { .. }));

    if only_cycles {
        let cycles = issues
            .into_iter()
            .filter_map(|issue| match issue {
                GraphIssue::Cycle { path } => Some(path),
                _ => None,
            })
            .collect();
        Error::CircularDependency { cycles }
    } else {
        Error::InvalidDependencies(issues)
    }
}
