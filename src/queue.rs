//! Shared job queue: a time-scored set with a parallel backup set.
//!
//! Enqueued ids land in both the primary and the backup set. Fetch pops the
//! minimum-scored id from the primary; Finalize removes the id from the
//! backup once its execution is accounted for. The backup set is the
//! recovery ledger: an external requeuer can re-insert entries that were
//! fetched but never finalized.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use redis::AsyncCommands;

use crate::config::{self, Provider};
use crate::error::{Error, ErrorCode};

/// How long a single fetch blocks waiting for work.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(2);

const DEFAULT_WINDOW_SECS: i64 = 120;

/// One pending execution: the catalog key and the intended execution minute
/// in epoch seconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueuedJob {
    pub id: String,
    pub score: f64,
}

impl QueuedJob {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

pub trait JobQueue: Send + Sync + Clone + 'static {
    /// Add `(id, score)` to both the primary and the backup set. Re-inserting
    /// an id already present is a no-op on membership.
    fn enqueue(&self, queued: &QueuedJob) -> impl Future<Output = Result<(), Error>> + Send;

    /// Pop the minimum-scored id from the primary set, blocking up to
    /// [`FETCH_TIMEOUT`]. `QueueIsEmpty` on timeout; `Rescheduled` when the
    /// popped score lies further than the window in the future (the id is
    /// re-inserted into the primary set only).
    fn fetch(&self) -> impl Future<Output = Result<QueuedJob, Error>> + Send;

    /// Remove `id` from the backup set. The primary set is untouched.
    fn finalize(&self, id: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Release the backing client connection.
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Redis-backed queue over two sorted sets, `minion-{org}-queue` and
/// `minion-{org}-queue-backup`.
#[derive(Clone)]
pub struct RedisQueue {
    name: String,
    backup_name: String,
    window: i64,
    // The blocking pop gets a connection of its own; writes multiplex on a
    // second one and are never stuck behind a BZPOPMIN.
    pop_conn: redis::aio::MultiplexedConnection,
    write_conn: redis::aio::MultiplexedConnection,
}

impl RedisQueue {
    pub async fn new(org: &str, provider: &Provider) -> Result<Self, Error> {
        let url = redis_url(&provider.config)?;
        let client = redis::Client::open(url.as_str()).map_err(|e| {
            Error::with_cause(ErrorCode::ServiceUnavailable, "invalid redis address", e)
        })?;

        let pop_conn = connect(&client).await?;
        let write_conn = connect(&client).await?;

        let window = provider
            .config
            .get("window")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(DEFAULT_WINDOW_SECS);

        let name = format!("minion-{org}-queue");
        Ok(Self {
            backup_name: format!("{name}-backup"),
            name,
            window,
            pop_conn,
            write_conn,
        })
    }

    async fn zadd(&self, set: &str, queued: &QueuedJob) -> Result<(), Error> {
        let mut conn = self.write_conn.clone();
        let _: i64 = conn
            .zadd(set, &queued.id, queued.score)
            .await
            .map_err(|e| queue_error(format!("failed adding job {}", queued.id), e))?;
        Ok(())
    }
}

impl JobQueue for RedisQueue {
    async fn enqueue(&self, queued: &QueuedJob) -> Result<(), Error> {
        tracing::debug!(job_id = %queued.id, score = queued.score, "enqueuing job");
        self.zadd(&self.name, queued).await?;
        self.zadd(&self.backup_name, queued).await?;
        Ok(())
    }

    async fn fetch(&self) -> Result<QueuedJob, Error> {
        let mut conn = self.pop_conn.clone();
        let popped: Option<(String, String, f64)> = conn
            .bzpopmin(&self.name, FETCH_TIMEOUT.as_secs_f64())
            .await
            .map_err(|e| queue_error("error fetching from queue", e))?;

        let Some((_, id, score)) = popped else {
            return Err(Error::new(ErrorCode::QueueIsEmpty, "queue is empty"));
        };

        let queued = QueuedJob::new(id, score);
        let now = Utc::now().timestamp();
        tracing::debug!(job_id = %queued.id, score = queued.score, now, "popped queued job");

        if queued.score as i64 - now > self.window {
            tracing::debug!(job_id = %queued.id, "job is not within the window, rescheduling");
            self.zadd(&self.name, &queued).await?;
            return Err(Error::new(
                ErrorCode::Rescheduled,
                format!("rescheduled job {}, not within window", queued.id),
            ));
        }

        Ok(queued)
    }

    async fn finalize(&self, id: &str) -> Result<(), Error> {
        tracing::debug!(job_id = %id, "finalizing job");
        let mut conn = self.write_conn.clone();
        let _: i64 = conn
            .zrem(&self.backup_name, id)
            .await
            .map_err(|e| queue_error(format!("failed removing job {id}"), e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        // Multiplexed connections close when the last clone drops.
        Ok(())
    }
}

async fn connect(client: &redis::Client) -> Result<redis::aio::MultiplexedConnection, Error> {
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| Error::with_cause(ErrorCode::ServiceUnavailable, "redis connection failed", e))
}

fn queue_error(message: impl Into<String>, e: redis::RedisError) -> Error {
    Error::with_cause(ErrorCode::ServiceUnavailable, message, e)
}

/// Build a `redis://` URL from a provider config with host, port, optional
/// password and database index (string or number).
pub(crate) fn redis_url(config: &serde_json::Map<String, serde_json::Value>) -> Result<String, Error> {
    let host = config::required_string(config, "host")?;
    let port = config::string_or_number(config, "port")?
        .ok_or_else(|| Error::new(ErrorCode::BadRequest, "'port' is required"))?;
    port.parse::<u16>().map_err(|_| {
        Error::new(
            ErrorCode::BadRequest,
            format!("'port' is not a valid port number: {port}"),
        )
    })?;

    let database = match config::string_or_number(config, "database")? {
        Some(db) => db.parse::<i64>().map_err(|_| {
            Error::new(
                ErrorCode::BadRequest,
                format!("'database' is not parsable as an integer: {db}"),
            )
        })?,
        None => 0,
    };

    let password = config::optional_string(config, "password").unwrap_or_default();
    if password.is_empty() {
        Ok(format!("redis://{host}:{port}/{database}"))
    } else {
        Ok(format!("redis://:{password}@{host}:{port}/{database}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        json.as_object().unwrap().clone()
    }

    #[test]
    fn url_without_password() {
        let cfg = config(serde_json::json!({"host": "127.0.0.1", "port": 6379}));
        assert_eq!(redis_url(&cfg).unwrap(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn url_with_password_and_database() {
        let cfg = config(serde_json::json!({
            "host": "cache.local", "port": "6380", "password": "hunter2", "database": "3"
        }));
        assert_eq!(
            redis_url(&cfg).unwrap(),
            "redis://:hunter2@cache.local:6380/3"
        );
    }

    #[test]
    fn numeric_database_is_accepted() {
        let cfg = config(serde_json::json!({"host": "h", "port": 6379, "database": 2}));
        assert_eq!(redis_url(&cfg).unwrap(), "redis://h:6379/2");
    }

    #[test]
    fn missing_host_fails() {
        let cfg = config(serde_json::json!({"port": 6379}));
        assert!(redis_url(&cfg).unwrap_err().is(ErrorCode::BadRequest));
    }

    #[test]
    fn missing_port_fails() {
        let cfg = config(serde_json::json!({"host": "h"}));
        assert!(redis_url(&cfg).unwrap_err().is(ErrorCode::BadRequest));
    }

    #[test]
    fn bad_port_type_fails() {
        let cfg = config(serde_json::json!({"host": "h", "port": [1]}));
        assert!(redis_url(&cfg).unwrap_err().is(ErrorCode::BadRequest));
    }

    #[test]
    fn unparsable_database_fails() {
        let cfg = config(serde_json::json!({"host": "h", "port": 6379, "database": "many"}));
        assert!(redis_url(&cfg).unwrap_err().is(ErrorCode::BadRequest));
    }
}
