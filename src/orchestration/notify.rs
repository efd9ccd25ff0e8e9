//! Hand-off to whatever delivers start reminders.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::core::task::TaskId;

/// One "start this step at" reminder.
#[derive(Debug, Clone, PartialEq)]
pub struct StartNotice {
    pub task_id: TaskId,
    pub name: String,
    pub scheduled_start: DateTime<Utc>,
}

/// Receives start reminders once auto-start is armed.
pub trait StartNotifier: Send + Sync {
    fn schedule(&self, notices: &[StartNotice]);

    /// Withdraw every reminder previously handed over.
    fn clear(&self) {}
}

/// Writes reminders to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl StartNotifier for LogNotifier {
    fn schedule(&self, notices: &[StartNotice]) {
        for notice in notices {
            info!(
                task = %notice.task_id,
                at = %notice.scheduled_start,
                "start reminder: {}",
                notice.name
            );
        }
    }
}
