//! JetStream KV catalog driver.
//!
//! Jobs live one JSON object per key in a KV bucket, keyed
//! `{prefix}/{org}/{account}/{group}/{id}`. The bucket is created on first
//! use so a fresh deployment needs no provisioning step.

use async_nats::jetstream::{self, kv};
use bytes::Bytes;
use futures::StreamExt;

use crate::config::{self, JobsRepository as RepositoryConfig};
use crate::error::{Error, ErrorCode};
use crate::job::{self, Job};
use crate::repository::{Repository, GROUP_DELETE_LIMIT};

pub const DEFAULT_BUCKET: &str = "minion-jobs";
pub const DEFAULT_PREFIX: &str = "minion";

pub async fn get_or_create(
    js: &jetstream::Context,
    config: kv::Config,
) -> Result<kv::Store, Error> {
    let name = config.bucket.clone();
    match js.create_key_value(config).await {
        Ok(store) => Ok(store),
        Err(_) => js
            .get_key_value(name.as_str())
            .await
            .map_err(|e| kv_error(format!("failed to open bucket {name}"), e)),
    }
}

/// Jobs repository backed by a JetStream KV bucket.
#[derive(Clone)]
pub struct KvRepository {
    store: kv::Store,
    prefix: String,
}

impl KvRepository {
    pub async fn new(org: &str, cfg: &RepositoryConfig) -> Result<Self, Error> {
        let servers = config::required_string(&cfg.config, "servers")?;
        let bucket = config::optional_string(&cfg.config, "bucket")
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());
        let prefix = config::optional_string(&cfg.config, "prefix")
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

        let client = async_nats::connect(servers.as_str()).await.map_err(|e| {
            Error::with_cause(ErrorCode::ServiceUnavailable, "nats connection failed", e)
        })?;
        let js = jetstream::new(client);
        let store = get_or_create(
            &js,
            kv::Config {
                bucket,
                history: 1,
                ..Default::default()
            },
        )
        .await?;

        Ok(Self {
            store,
            prefix: format!("{prefix}/{org}"),
        })
    }

    fn account_prefix(&self, account: &str) -> String {
        format!("{}/{}/", self.prefix, account)
    }

    fn key(&self, account: &str, group: &str, id: &str) -> String {
        if group.is_empty() {
            format!("{}/{}/{}", self.prefix, account, id)
        } else {
            format!("{}/{}/{}/{}", self.prefix, account, group, id)
        }
    }

    /// Keys under an account (optionally restricted to one group), relative
    /// to the account prefix.
    async fn relative_keys(&self, account: &str, group: &str) -> Result<Vec<String>, Error> {
        let account_prefix = self.account_prefix(account);
        let group_prefix = (!group.is_empty()).then(|| format!("{group}/"));

        let mut keys = self
            .store
            .keys()
            .await
            .map_err(|e| kv_error("failed to list job objects", e))?;

        let mut out = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.map_err(|e| kv_error("failed to list job objects", e))?;
            let Some(relative) = key.strip_prefix(&account_prefix) else {
                continue;
            };
            if let Some(gp) = &group_prefix {
                if !relative.starts_with(gp.as_str()) {
                    continue;
                }
            }
            out.push(relative.to_string());
        }

        out.sort();
        Ok(out)
    }
}

impl Repository for KvRepository {
    async fn create(&self, account: &str, group: &str, mut job: Job) -> Result<Job, Error> {
        job.id = job::new_id();
        let id = job.id.clone();
        self.update(account, group, &id, job).await
    }

    async fn get(&self, account: &str, group: &str, id: &str) -> Result<Job, Error> {
        if id.is_empty() {
            return Err(Error::new(ErrorCode::BadRequest, "id cannot be empty"));
        }

        let key = self.key(account, group, id);
        let value = self
            .store
            .get(key.as_str())
            .await
            .map_err(|e| kv_error(format!("failed to get job object {key}"), e))?
            .ok_or_else(|| Error::new(ErrorCode::NotFound, format!("job not found: {key}")))?;

        let mut job: Job = serde_json::from_slice(&value).map_err(|e| {
            Error::with_cause(
                ErrorCode::InternalError,
                format!("failed to decode stored job {key}"),
                e,
            )
        })?;
        // The path identity is authoritative over whatever was stored.
        job.account = account.to_string();
        job.group = group.to_string();
        Ok(job)
    }

    async fn update(&self, account: &str, group: &str, id: &str, mut job: Job) -> Result<Job, Error> {
        if id.is_empty() || job.id != id {
            return Err(Error::new(
                ErrorCode::BadRequest,
                format!("job id mismatch: '{}' != '{}'", job.id, id),
            ));
        }

        job.account = account.to_string();
        job.group = group.to_string();
        job.touch();

        let key = self.key(account, group, id);
        let encoded = serde_json::to_vec(&job)?;
        self.store
            .put(key.as_str(), Bytes::from(encoded))
            .await
            .map_err(|e| kv_error(format!("failed to put job object {key}"), e))?;

        tracing::info!(job_id = %job.id, key = %key, "stored job");
        Ok(job)
    }

    async fn list(&self, account: &str, group: &str) -> Result<Vec<String>, Error> {
        tracing::debug!(account, group, "listing jobs");
        self.relative_keys(account, group).await
    }

    async fn delete(&self, account: &str, group: &str, id: &str) -> Result<(), Error> {
        if !id.is_empty() {
            let key = self.key(account, group, id);
            tracing::info!(key = %key, "deleting job");
            return self
                .store
                .purge(key.as_str())
                .await
                .map_err(|e| kv_error(format!("failed to delete job object {key}"), e));
        }

        if group.is_empty() {
            return Err(Error::new(
                ErrorCode::BadRequest,
                "group and id cannot both be empty",
            ));
        }

        let members = self.relative_keys(account, group).await?;
        if members.len() > GROUP_DELETE_LIMIT {
            return Err(Error::new(
                ErrorCode::LimitExceeded,
                format!(
                    "group {group} has {} jobs, refusing to delete more than {GROUP_DELETE_LIMIT}",
                    members.len()
                ),
            ));
        }

        tracing::info!(account, group, count = members.len(), "deleting job group");
        let account_prefix = self.account_prefix(account);
        for member in members {
            let key = format!("{account_prefix}{member}");
            self.store
                .purge(key.as_str())
                .await
                .map_err(|e| kv_error(format!("failed to delete job object {key}"), e))?;
        }
        Ok(())
    }
}

fn kv_error(message: impl Into<String>, e: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::with_cause(ErrorCode::ServiceUnavailable, message, e)
}
