use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{error::AppError, services::recommendations::RecommendationPipeline};

/// Triggers pipeline runs on a fixed interval until shutdown.
pub struct Scheduler {
    pipeline: Arc<RecommendationPipeline>,
    interval: Duration,
    run_on_startup: bool,
    /// Token to signal scheduler shutdown; in-flight runs are cancelled with it.
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(
        pipeline: Arc<RecommendationPipeline>,
        interval: Duration,
        run_on_startup: bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            interval,
            run_on_startup,
            shutdown,
        }
    }

    /// Main scheduler loop.
    pub async fn run(self) {
        let first = if self.run_on_startup {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };

        let mut ticker = tokio::time::interval_at(first, self.interval);
        // A run that overruns its slot does not cause a burst of catch-up runs
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.interval.as_secs(),
            run_on_startup = self.run_on_startup,
            "Starting recommendation scheduler"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.trigger().await;
                }
            }
        }

        info!("Recommendation scheduler stopped");
    }

    async fn trigger(&self) {
        match self.pipeline.run_once(self.shutdown.child_token()).await {
            Ok(summary) => {
                info!(run_id = %summary.run_id, status = ?summary.status, "Scheduled run completed");
            }
            Err(AppError::RunInProgress) => {
                warn!("Previous run still in progress, skipping scheduled run");
            }
            Err(e) => {
                error!(error = %e, "Scheduled run could not start");
            }
        }
    }
}
