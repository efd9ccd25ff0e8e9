//! Task data model for the scheduling DAG.
//!
//! Tasks are the cooking steps handed to the core by whatever extracted
//! them. They are immutable once loaded: an identifier, a duration, the
//! identifiers they depend on, and display-only metadata.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Unique identifier for a task within one schedule.
///
/// Identifiers come from the task source (e.g. `"preheat"`), so this is a
/// string newtype rather than a generated id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a task identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Display grouping for a step. Never consulted by scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    Prep,
    Cook,
    Bake,
    Rest,
    Serve,
    #[default]
    #[serde(other)]
    Other,
}

impl std::fmt::Display for StepCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepCategory::Prep => write!(f, "prep"),
            StepCategory::Cook => write!(f, "cook"),
            StepCategory::Bake => write!(f, "bake"),
            StepCategory::Rest => write!(f, "rest"),
            StepCategory::Serve => write!(f, "serve"),
            StepCategory::Other => write!(f, "other"),
        }
    }
}

/// A single timed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name; falls back to the identifier when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form description of the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Duration in seconds. Fractional seconds are allowed.
    #[serde(rename = "duration")]
    pub duration_secs: f64,
    /// Identifiers of tasks that must finish before this one starts.
    #[serde(default)]
    pub depends_on: Vec<TaskId>,
    /// Whether the step can run alongside others (e.g. an oven preheating).
    #[serde(default)]
    pub parallel: bool,
    /// Display grouping.
    #[serde(default)]
    pub category: StepCategory,
}

impl Task {
    /// Create a task with no dependencies.
    pub fn new(id: impl Into<TaskId>, duration_secs: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            duration_secs,
            depends_on: Vec::new(),
            parallel: false,
            category: StepCategory::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn depends_on<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn category(mut self, category: StepCategory) -> Self {
        self.category = category;
        self
    }

    /// Name to show in listings.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Whether the duration is usable for scheduling.
    pub fn has_valid_duration(&self) -> bool {
        self.duration_secs.is_finite() && self.duration_secs >= 0.0
    }

    /// Duration as a time span, rounded to the millisecond.
    ///
    /// Invalid durations (negative, NaN, infinite) map to zero; the graph
    /// reports them as structural issues before any schedule is built.
    pub fn duration(&self) -> TimeDelta {
        if !self.has_valid_duration() {
            return TimeDelta::zero();
        }
        TimeDelta::try_milliseconds((self.duration_secs * 1000.0).round() as i64)
            .unwrap_or(TimeDelta::MAX)
    }
}
