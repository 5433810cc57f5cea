//! Process counters served at `GET /metrics` in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    jobs_scheduled: AtomicU64,
    executions_started: AtomicU64,
    executions_failed: AtomicU64,
    fetch_errors: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            jobs_scheduled: AtomicU64::new(0),
            executions_started: AtomicU64::new(0),
            executions_failed: AtomicU64::new(0),
            fetch_errors: AtomicU64::new(0),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_scheduled(&self) {
        self.jobs_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn execution_started(&self) {
        self.executions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn execution_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_scheduled(&self) -> u64 {
        self.jobs_scheduled.load(Ordering::Relaxed)
    }

    pub fn executions_started(&self) -> u64 {
        self.executions_started.load(Ordering::Relaxed)
    }

    /// Render the counters as Prometheus exposition text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut counter = |name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        };

        counter(
            "minion_jobs_scheduled_total",
            "Jobs enqueued by the scheduler.",
            self.jobs_scheduled.load(Ordering::Relaxed),
        );
        counter(
            "minion_executions_started_total",
            "Job executions dispatched to a runner.",
            self.executions_started.load(Ordering::Relaxed),
        );
        counter(
            "minion_executions_failed_total",
            "Runner invocations that returned an error.",
            self.executions_failed.load(Ordering::Relaxed),
        );
        counter(
            "minion_queue_fetch_errors_total",
            "Queue fetches that failed for reasons other than an empty queue.",
            self.fetch_errors.load(Ordering::Relaxed),
        );

        out.push_str(&format!(
            "# HELP minion_uptime_seconds Seconds since process start.\n# TYPE minion_uptime_seconds gauge\nminion_uptime_seconds {}\n",
            self.started.elapsed().as_secs()
        ));
        out
    }
}
