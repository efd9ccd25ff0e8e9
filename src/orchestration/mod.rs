//! Live timer orchestration.
//!
//! A loaded schedule becomes one [`TimerHandle`] per step. The
//! [`TimerOrchestrator`] owns them, auto-starts each when its scheduled
//! start arrives, and forwards every state change on a broadcast channel
//! as [`OrchestratorEvent`]s.

pub mod events;
pub mod handle;
pub mod notify;
pub mod orchestrator;
pub mod timer;
pub mod view;

pub use events::{OrchestratorEvent, ScheduleId};
pub use handle::TimerHandle;
pub use notify::{LogNotifier, StartNotice, StartNotifier};
pub use orchestrator::{OrchestratorConfig, TimerOrchestrator};
pub use timer::{TickOutcome, TimerState, TimerStateMachine, Transition};
pub use view::{format_clock, OrchestratorSnapshot, TimerView};
