//! Distributed single-writer lock.
//!
//! The scheduler locks the current minute's epoch seconds so exactly one
//! instance per minute enqueues. Acquisition is set-if-absent with a TTL;
//! there is no explicit release, the key expires on its own.

use std::future::Future;
use std::time::Duration;

use crate::config::{self, Provider};
use crate::error::{Error, ErrorCode};
use crate::queue::redis_url;

const DEFAULT_TTL: Duration = Duration::from_secs(120);

pub trait Locker: Send + Sync + Clone + 'static {
    /// Acquire the named lock for `owner`. An `Err` means the lock is held
    /// elsewhere (`Conflict`) or the backend failed (`ServiceUnavailable`).
    fn lock(&self, key: &str, owner: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Redis SET-NX-EX lock keyed `minion-{org}-lock-<key>`.
#[derive(Clone)]
pub struct RedisLocker {
    prefix: String,
    ttl: Duration,
    conn: redis::aio::MultiplexedConnection,
}

impl RedisLocker {
    pub async fn new(org: &str, provider: &Provider) -> Result<Self, Error> {
        let url = redis_url(&provider.config)?;
        let client = redis::Client::open(url.as_str()).map_err(|e| {
            Error::with_cause(ErrorCode::ServiceUnavailable, "invalid redis address", e)
        })?;
        let conn = client.get_multiplexed_async_connection().await.map_err(|e| {
            Error::with_cause(ErrorCode::ServiceUnavailable, "redis connection failed", e)
        })?;

        let ttl = match provider.ttl.as_deref() {
            Some(ttl) => config::parse_duration(ttl)?,
            None => DEFAULT_TTL,
        };

        Ok(Self {
            prefix: format!("minion-{org}-lock"),
            ttl,
            conn,
        })
    }
}

impl Locker for RedisLocker {
    async fn lock(&self, key: &str, owner: &str) -> Result<(), Error> {
        let key = format!("{}-{}", self.prefix, key);
        let mut conn = self.conn.clone();

        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::with_cause(ErrorCode::ServiceUnavailable, "lock request failed", e)
            })?;

        match set {
            Some(_) => Ok(()),
            None => Err(Error::new(
                ErrorCode::Conflict,
                format!("didn't acquire lock {key}"),
            )),
        }
    }
}
