//! Backward scheduling and live timers for multi-step cooking.
//!
//! [`core`] turns a set of timed steps with dependencies into start times
//! that finish the critical chain exactly at a target instant.
//! [`orchestration`] runs one countdown per step, auto-starting each when
//! its time comes.

pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod steps;

pub mod actors;
pub mod orchestration;

pub use crate::core::{Schedule, ScheduleCalculator, ScheduledTask, StepCategory, Task, TaskGraph, TaskId};
pub use error::{Error, Result};
pub use orchestration::{OrchestratorEvent, TimerOrchestrator, TimerState};
