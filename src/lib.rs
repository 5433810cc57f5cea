//! # minion
//!
//! Multi-tenant, horizontally-scaled cron-style job scheduling service.
//!
//! ## How it works
//!
//! - Job definitions live in a durable catalog, one JSON object per job,
//!   partitioned by account and group.
//! - Every instance runs a **loader** that mirrors enabled jobs into a local
//!   cache on a refresh interval.
//! - Once a minute, instances race for a distributed lock named after the
//!   minute; the winning **scheduler** enqueues every job due that minute
//!   into a shared scored-set queue (plus a backup set for crash recovery).
//! - Any instance's **executer** pops queued jobs, resolves the configured
//!   **runner** (dummy, instance, database, service or task) and invokes it
//!   with bounded retry, giving at-least-once execution.
//! - A small HTTP API manages the catalog and exposes ping/version/metrics.
//!
//! ## Job example (JSON stored in the catalog)
//!
//! ```json
//! {
//!   "name": "nightly-stop",
//!   "group": "infra",
//!   "enabled": true,
//!   "schedule_expression": "0 2 * * *",
//!   "details": { "runner": "instance", "instance_id": "i-123", "instance_action": "stop" },
//!   "modified_by": "someone"
//! }
//! ```

pub mod api;
pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod executer;
pub mod job;
pub mod kv;
pub mod loader;
pub mod lock;
pub mod metrics;
pub mod queue;
pub mod repository;
pub mod rollback;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod template;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use config::Config;
pub use error::{Error, ErrorCode};
pub use job::Job;
