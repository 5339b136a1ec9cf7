//! # Cleanup Scheduler
//!
//! Background task that purges expired handshake state rows and sessions and
//! reclaims idle rate-limiter buckets. Each tick is best-effort: a failure is
//! logged and the loop keeps running, since expiry is always re-checked at
//! read time and the next tick retries the purge.

use std::sync::Arc;

use metrics::{counter, histogram};
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::CleanupConfig;
use crate::rate_limit::RateLimiter;
use crate::repositories::oauth_state::OAuthStateRepository;
use crate::repositories::session::SessionRepository;

/// Background cleanup service.
pub struct CleanupScheduler {
    config: CleanupConfig,
    states: OAuthStateRepository,
    sessions: SessionRepository,
    rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct TickStats {
    states_purged: u64,
    sessions_purged: u64,
    buckets_reclaimed: u64,
}

impl CleanupScheduler {
    /// Create a new cleanup scheduler.
    pub fn new(
        config: CleanupConfig,
        states: OAuthStateRepository,
        sessions: SessionRepository,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            states,
            sessions,
            rate_limiter,
        }
    }

    /// Run the cleanup loop until the shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_seconds = self.config.interval_seconds,
            "Starting cleanup scheduler"
        );
        let tick_interval = TokioDuration::from_secs(self.config.interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cleanup scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    match self.tick().await {
                        Ok(stats) => {
                            if stats != TickStats::default() {
                                debug!(
                                    states_purged = stats.states_purged,
                                    sessions_purged = stats.sessions_purged,
                                    buckets_reclaimed = stats.buckets_reclaimed,
                                    "Cleanup tick completed"
                                );
                            }
                        }
                        Err(err) => {
                            error!(error = ?err, "Cleanup tick failed");
                        }
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("authgate_cleanup_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Cleanup scheduler stopped");
    }

    async fn tick(&self) -> Result<TickStats, sea_orm::DbErr> {
        let mut stats = TickStats::default();

        // The two purges are independent; a failure in one still lets the
        // other run on the next tick, so they share one error path.
        stats.states_purged = self.states.cleanup_expired().await?;
        stats.sessions_purged = self.sessions.cleanup_expired().await?;
        stats.buckets_reclaimed = self.rate_limiter.sweep() as u64;

        counter!("authgate_cleanup_states_purged_total").increment(stats.states_purged);
        counter!("authgate_cleanup_sessions_purged_total").increment(stats.sessions_purged);
        counter!("authgate_cleanup_buckets_reclaimed_total").increment(stats.buckets_reclaimed);

        Ok(stats)
    }
}
