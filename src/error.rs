use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::dag::GraphIssue;
use crate::core::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Malformed task graph: {0}")]
    MalformedGraph(GraphIssue),

    #[error("Circular dependency: {}", format_cycles(.cycles))]
    CircularDependency { cycles: Vec<Vec<TaskId>> },

    #[error("Invalid dependencies: {}", format_issues(.0))]
    InvalidDependencies(Vec<GraphIssue>),

    #[error("Schedule out of range: {0}")]
    ScheduleOutOfRange(String),

    #[error("No tasks to schedule")]
    NoTasks,

    #[error("No timers loaded")]
    NoTimers,

    #[error("Target time {target} is not after {now}")]
    TargetTimeInPast {
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("Invalid time '{0}': expected RFC 3339 or HH:MM")]
    InvalidTime(String),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_cycles(cycles: &[Vec<TaskId>]) -> String {
    if cycles.is_empty() {
        return "no valid ordering exists".to_string();
    }
    cycles
        .iter()
        .map(|cycle| {
            let mut names: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
            if let Some(first) = cycle.first() {
                names.push(first.to_string());
            }
            names.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_issues(issues: &[GraphIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
