//! Enqueues due jobs, once per minute, on exactly one instance.
//!
//! Every minute each instance races for the lock named after the minute's
//! epoch seconds; the winner walks the cached jobs and enqueues every job
//! whose next firing after `now - 1min` is `now`. Set semantics in the queue
//! dedupe re-inserts, and the lock filters duplicate instances, so no other
//! tie-break is needed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::cache::JobsCache;
use crate::lock::Locker;
use crate::metrics::Metrics;
use crate::queue::{JobQueue, QueuedJob};
use crate::schedule;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Scheduler<L, Q> {
    id: String,
    cache: Arc<JobsCache>,
    locker: L,
    queue: Q,
    metrics: Arc<Metrics>,
}

impl<L: Locker, Q: JobQueue> Scheduler<L, Q> {
    pub fn new(
        id: impl Into<String>,
        cache: Arc<JobsCache>,
        locker: L,
        queue: Q,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id: id.into(),
            cache,
            locker,
            queue,
            metrics,
        }
    }

    /// Spawn the minute loop.
    pub fn start(&self, shutdown: CancellationToken) {
        tracing::info!(id = %self.id, "scheduler starting");
        let scheduler = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(id = %scheduler.id, "shutting down scheduler");
                        return;
                    }
                    _ = ticker.tick() => {
                        let now = schedule::truncate_minute(Utc::now());
                        let s = scheduler.clone();
                        tokio::spawn(async move { s.run(now).await });
                    }
                }
            }
        });

        tracing::info!(id = %self.id, "scheduler started");
    }

    /// Schedule the jobs due at `now` (minute-truncated).
    pub async fn run(&self, now: DateTime<Utc>) {
        let minute = now.timestamp();
        if let Err(e) = self.locker.lock(&minute.to_string(), &self.id).await {
            tracing::debug!(id = %self.id, error = %e, "failed to acquire lock, moving on");
            return;
        }

        let basis = now - chrono::Duration::minutes(1);
        tracing::info!(id = %self.id, %now, %basis, "running jobs scheduler");

        // Snapshot under the mutex; enqueue only after it is released.
        let jobs = self.cache.snapshot();

        for (key, job) in jobs {
            if !job.enabled {
                continue;
            }

            let next = match schedule::next_run(basis, &job.schedule_expression) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "skipping job with bad schedule");
                    continue;
                }
            };

            if next == now {
                tracing::info!(id = %self.id, key = %key, "enqueuing job");
                let queued = QueuedJob::new(key.clone(), minute as f64);
                if let Err(e) = self.queue.enqueue(&queued).await {
                    tracing::error!(key = %key, error = %e, "failed to enqueue job");
                    continue;
                }
                self.metrics.job_scheduled();
            }
        }

        tracing::debug!(id = %self.id, "done scheduling jobs");
    }
}
