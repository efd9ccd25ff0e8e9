//! Background tasks that drive timers forward.
//!
//! Each actor is an independent tokio task woken on a fixed interval:
//! - Per-timer countdown (TimerTicker)
//! - Wall-clock auto-start (AutoStartPoller)
//!
//! Actors own no state of their own. They call back into the handle or
//! orchestrator they were spawned for, which serialize every mutation.

pub mod poller;
pub mod ticker;

use tokio_util::sync::CancellationToken;

pub use poller::AutoStartPoller;
pub use ticker::TimerTicker;

/// Handle to a running actor, used for shutdown.
#[derive(Debug)]
pub struct ActorHandle {
    cancel: CancellationToken,
}

impl ActorHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Signal the actor to stop. Takes effect before its next wake-up.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
