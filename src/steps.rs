//! Step files and target-time parsing for the command line.
//!
//! A step file lists already-resolved tasks, either as TOML `[[step]]`
//! tables or as JSON (a bare array or `{ "steps": [...] }`).

use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::core::task::Task;
use crate::{Error, Result};

#[derive(Deserialize)]
struct TomlSteps {
    #[serde(default)]
    step: Vec<Task>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSteps {
    List(Vec<Task>),
    Wrapped { steps: Vec<Task> },
}

/// Load tasks from `path`. `.json` files are read as JSON, anything else
/// as TOML.
pub fn load_steps(path: &Path) -> Result<Vec<Task>> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let tasks = if is_json {
        parse_json(&content)?
    } else {
        parse_toml(&content)?
    };
    debug!(path = %path.display(), steps = tasks.len(), "steps loaded");
    Ok(tasks)
}

pub fn parse_toml(content: &str) -> Result<Vec<Task>> {
    let steps: TomlSteps = toml::from_str(content)?;
    Ok(steps.step)
}

pub fn parse_json(content: &str) -> Result<Vec<Task>> {
    let steps: JsonSteps = serde_json::from_str(content)?;
    Ok(match steps {
        JsonSteps::List(tasks) => tasks,
        JsonSteps::Wrapped { steps } => steps,
    })
}

/// Parse a target completion time.
///
/// Accepts RFC 3339 (`2026-10-18T18:00:00+02:00`) or `HH:MM`, which means
/// that time on `now`'s date in `now`'s time zone.
pub fn parse_target_time<Tz: TimeZone>(input: &str, now: &DateTime<Tz>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(input) {
        return Ok(instant.with_timezone(&Utc));
    }

    let time = NaiveTime::parse_from_str(input, "%H:%M")
        .map_err(|_| Error::InvalidTime(input.to_string()))?;
    let local = now.date_naive().and_time(time);
    now.timezone()
        .from_local_datetime(&local)
        .earliest()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(|| Error::InvalidTime(input.to_string()))
}
