//! Presentation helpers over a computed schedule.

use crate::core::schedule::ScheduledTask;
use crate::core::task::TaskId;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Default window within which parallel steps are shown together.
pub const DEFAULT_GROUP_WINDOW_SECS: i64 = 60;

/// Steps that start close enough together to be shown as one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelGroup {
    /// Start of the first step in the group.
    pub start: DateTime<Utc>,
    pub tasks: Vec<ScheduledTask>,
}

impl ParallelGroup {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn ids(&self) -> Vec<&TaskId> {
        self.tasks.iter().map(|t| &t.task.id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    // Ended sorts first so a step finishing at the instant another starts reads naturally.
    Ended,
    Started,
}

impl std::fmt::Display for TimelineEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimelineEventKind::Started => write!(f, "start"),
            TimelineEventKind::Ended => write!(f, "end"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub at: DateTime<Utc>,
    pub kind: TimelineEventKind,
    pub task_id: TaskId,
    pub name: String,
}

/// Fold steps into display groups.
///
/// Steps are taken in start order. A step joins the current group when both
/// it and the group's last step are parallel-eligible and it starts within
/// `window` of the group's first step; otherwise it opens a new group.
pub fn group_parallel_steps(tasks: &[ScheduledTask], window: TimeDelta) -> Vec<ParallelGroup> {
    let mut sorted: Vec<&ScheduledTask> = tasks.iter().collect();
    // stable sort keeps topological order among equal starts
    sorted.sort_by_key(|t| t.start);

    let mut groups: Vec<ParallelGroup> = Vec::new();
    for task in sorted {
        let joins = match groups.last() {
            Some(group) => {
                let last_parallel = group.tasks.last().map(|t| t.task.parallel).unwrap_or(false);
                task.task.parallel && last_parallel && task.start - group.start <= window
            }
            None => false,
        };

        match groups.last_mut() {
            Some(group) if joins => group.tasks.push(task.clone()),
            _ => groups.push(ParallelGroup {
                start: task.start,
                tasks: vec![task.clone()],
            }),
        }
    }

    groups
}

/// Start and end events for every step, in chronological order.
pub fn generate_timeline(tasks: &[ScheduledTask]) -> Vec<TimelineEvent> {
    let mut events: Vec<(usize, TimelineEvent)> = Vec::with_capacity(tasks.len() * 2);
    for (position, scheduled) in tasks.iter().enumerate() {
        let name = scheduled.task.display_name().to_string();
        events.push((
            position,
            TimelineEvent {
                at: scheduled.start,
                kind: TimelineEventKind::Started,
                task_id: scheduled.task.id.clone(),
                name: name.clone(),
            },
        ));
        events.push((
            position,
            TimelineEvent {
                at: scheduled.end,
                kind: TimelineEventKind::Ended,
                task_id: scheduled.task.id.clone(),
                name,
            },
        ));
    }

    events.sort_by(|(pa, a), (pb, b)| {
        a.at.cmp(&b.at)
            .then(a.kind.cmp(&b.kind))
            .then(pa.cmp(pb))
    });
    events.into_iter().map(|(_, event)| event).collect()
}
