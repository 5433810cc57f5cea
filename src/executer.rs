//! Pulls queued jobs and runs them.
//!
//! The fetch loop ticks every second and never blocks on a runner: each
//! execution runs on its own task with a bounded retry loop, so one slow
//! downstream call cannot stall dispatch. Finalize is invoked exactly once
//! per execution; what happens on retry exhaustion is a policy decision
//! carried in the configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::JobsCache;
use crate::config::ExhaustionPolicy;
use crate::error::ErrorCode;
use crate::job::Job;
use crate::metrics::Metrics;
use crate::queue::{JobQueue, QueuedJob};
use crate::runner::Runner;

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Executer<Q> {
    id: String,
    cache: Arc<JobsCache>,
    queue: Q,
    runners: Arc<HashMap<String, Runner>>,
    policy: ExhaustionPolicy,
    metrics: Arc<Metrics>,
}

impl<Q: JobQueue> Executer<Q> {
    pub fn new(
        id: impl Into<String>,
        cache: Arc<JobsCache>,
        queue: Q,
        runners: Arc<HashMap<String, Runner>>,
        policy: ExhaustionPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id: id.into(),
            cache,
            queue,
            runners,
            policy,
            metrics,
        }
    }

    /// Spawn the fetch loop.
    pub fn start(&self, shutdown: CancellationToken) {
        tracing::info!(id = %self.id, "executer starting");
        let executer = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(id = %executer.id, "shutting down executer");
                        return;
                    }
                    _ = ticker.tick() => {
                        match executer.queue.fetch().await {
                            Ok(queued) => {
                                executer.dispatch(queued, &shutdown);
                            }
                            Err(e) if e.is(ErrorCode::QueueIsEmpty) => {
                                tracing::debug!(id = %executer.id, "no jobs");
                            }
                            Err(e) if e.is(ErrorCode::Rescheduled) => {
                                tracing::debug!(id = %executer.id, error = %e, "fetched job rescheduled");
                            }
                            Err(e) => {
                                tracing::error!(id = %executer.id, error = %e, "error fetching jobs from the queue");
                                executer.metrics.fetch_error();
                            }
                        }
                    }
                }
            }
        });

        tracing::info!(id = %self.id, "executer started");
    }

    /// Resolve the runner for a fetched job and spawn its execution.
    /// Returns false when the job was dropped (unknown id or runner).
    pub fn dispatch(&self, queued: QueuedJob, shutdown: &CancellationToken) -> bool {
        let Some(job) = self.cache.get(&queued.id) else {
            tracing::warn!(id = %self.id, job_id = %queued.id, "job not found in the job cache");
            return false;
        };

        let Some(name) = job.runner().map(str::to_string) else {
            tracing::warn!(id = %self.id, job_id = %queued.id, "runner not found in the job details");
            return false;
        };

        let Some(runner) = self.runners.get(&name).cloned() else {
            tracing::warn!(id = %self.id, runner = %name, "no runner configured for requested runner");
            return false;
        };

        self.metrics.execution_started();
        let queue = self.queue.clone();
        let policy = self.policy;
        let metrics = Arc::clone(&self.metrics);
        let shutdown = shutdown.clone();
        let id = queued.id;
        tokio::spawn(async move {
            Self::run(shutdown, runner, job, id, queue, policy, metrics).await;
        });
        true
    }

    /// Run one job with bounded retry, then settle the backup entry.
    pub async fn run(
        shutdown: CancellationToken,
        runner: Runner,
        job: Job,
        queued_id: String,
        queue: Q,
        policy: ExhaustionPolicy,
        metrics: Arc<Metrics>,
    ) {
        let mut exhausted = false;

        'attempts: for attempt in 1..=MAX_ATTEMPTS {
            tracing::debug!(job_id = %queued_id, attempt, "running job executer");

            match runner.run(&shutdown, &job.account, &job.details).await {
                Ok(out) => {
                    tracing::debug!(job_id = %queued_id, output = %out, "job run succeeded");
                    break 'attempts;
                }
                Err(e) => {
                    tracing::error!(job_id = %queued_id, attempt, error = %e, "failed running job");
                    metrics.execution_failed();

                    if attempt == MAX_ATTEMPTS {
                        exhausted = true;
                        break 'attempts;
                    }

                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            tracing::warn!(job_id = %queued_id, "cancelling retrying of job");
                            break 'attempts;
                        }
                        _ = tokio::time::sleep(RETRY_WAIT) => {
                            tracing::info!(job_id = %queued_id, attempt, "retrying job");
                        }
                    }
                }
            }
        }

        if exhausted && policy == ExhaustionPolicy::LeaveInBackup {
            tracing::warn!(job_id = %queued_id, "retries exhausted, leaving job in backup set");
            return;
        }

        if let Err(e) = queue.finalize(&queued_id).await {
            tracing::error!(job_id = %queued_id, error = %e, "error finalizing job");
        }
    }
}
