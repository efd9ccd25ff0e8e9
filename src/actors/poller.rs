//! Auto-start actor: starts pending timers once their start time arrives.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::orchestration::orchestrator::TimerOrchestrator;

use super::ActorHandle;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Actor that runs the orchestrator's poll pass on a fixed interval.
///
/// The caller runs the first pass itself, so the first wake-up here is one
/// full period after spawning.
pub struct AutoStartPoller {
    orchestrator: TimerOrchestrator,
    interval: Duration,
}

impl AutoStartPoller {
    pub fn new(orchestrator: TimerOrchestrator) -> Self {
        Self {
            orchestrator,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self) -> ActorHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        debug!("AutoStartPoller::spawn every {:?}", self.interval);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        trace!("AutoStartPoller cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if !self.orchestrator.poll_with(&token).await {
                            trace!("AutoStartPoller finished");
                            break;
                        }
                    }
                }
            }
        });

        ActorHandle::new(cancel)
    }
}
