// Retention Sweeper
// Periodic purge of terminal jobs whose retention window has elapsed

use crate::application::registry::JobRegistry;
use crate::application::worker::ShutdownToken;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// How often expired jobs are swept out of the registry (60s)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Retention sweeper
///
/// Reads already treat expired records as absent; the sweeper only bounds
/// memory for records nobody polls again.
pub struct RetentionSweeper {
    registry: Arc<JobRegistry>,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self::with_interval(registry, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_interval(registry: Arc<JobRegistry>, sweep_interval: Duration) -> Self {
        Self {
            registry,
            sweep_interval,
        }
    }

    /// Run the sweep loop until `shutdown` fires (spawn with `tokio::spawn`)
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            retention_secs = self.registry.retention().window.as_secs(),
            "Retention sweeper started"
        );

        let mut tick = interval(self.sweep_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    let removed = self.sweep_now();
                    debug!(removed, remaining = self.registry.len(), "Retention sweep finished");
                }
            }
        }

        info!("Retention sweeper stopped");
    }

    /// Purge immediately
    pub fn sweep_now(&self) -> usize {
        self.registry.purge_expired()
    }
}
