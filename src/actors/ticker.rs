//! Countdown actor for a single running timer.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::orchestration::handle::TimerHandle;

use super::ActorHandle;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Actor that ticks one timer until it completes or is stopped.
///
/// The first tick fires immediately, so a zero-length step completes as soon
/// as it starts.
pub struct TimerTicker {
    handle: TimerHandle,
    interval: Duration,
}

impl TimerTicker {
    pub fn new(handle: TimerHandle) -> Self {
        Self {
            handle,
            interval: TICK_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> ActorHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        debug!(task = %self.handle.id(), "TimerTicker::spawn");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        trace!(task = %self.handle.id(), "TimerTicker cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if !self.handle.tick(&token).await {
                            trace!(task = %self.handle.id(), "TimerTicker finished");
                            break;
                        }
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
