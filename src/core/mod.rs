//! Scheduling core: tasks, the dependency graph, and start-time derivation.
//!
//! Everything in here is synchronous and free of wall-clock reads; the
//! orchestration layer supplies `now` where it matters.

pub mod dag;
pub mod schedule;
pub mod task;
pub mod timeline;

pub use dag::{GraphIssue, TaskGraph};
pub use schedule::{Schedule, ScheduleCalculator, ScheduledTask, DEFAULT_BUFFER_SECS};
pub use task::{StepCategory, Task, TaskId};
pub use timeline::{ParallelGroup, TimelineEvent, TimelineEventKind, DEFAULT_GROUP_WINDOW_SECS};
