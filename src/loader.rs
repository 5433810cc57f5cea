//! Loads the job catalog into the local cache.
//!
//! The first pass runs synchronously inside `start` so the scheduler and
//! executer only ever see a populated cache; afterwards a background loop
//! refreshes on the configured interval. A refresh builds a complete
//! replacement map and swaps it in at the end; a failed account listing
//! aborts the refresh and leaves the previous cache untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::JobsCache;
use crate::error::Error;
use crate::job::Job;
use crate::repository::{split_key, Repository};

#[derive(Clone)]
pub struct Loader<R> {
    id: String,
    accounts: Vec<String>,
    cache: Arc<JobsCache>,
    repository: R,
    refresh_interval: Duration,
}

impl<R: Repository> Loader<R> {
    pub fn new(
        id: impl Into<String>,
        accounts: Vec<String>,
        cache: Arc<JobsCache>,
        repository: R,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            accounts,
            cache,
            repository,
            refresh_interval,
        }
    }

    /// Run one blocking refresh, then spawn the periodic loop.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<(), Error> {
        tracing::info!(id = %self.id, "loader starting");
        self.run().await?;

        let loader = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(loader.refresh_interval);
            // The synchronous first pass already covered the first tick.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!(id = %loader.id, "shutting down loader");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = loader.run().await {
                            tracing::error!(id = %loader.id, error = %e, "job refresh failed");
                        }
                    }
                }
            }
        });

        tracing::info!(id = %self.id, "loader started");
        Ok(())
    }

    /// Refresh the cache from the repository.
    pub async fn run(&self) -> Result<(), Error> {
        tracing::debug!(id = %self.id, "running jobs loader");

        let mut fresh: HashMap<String, Job> = HashMap::new();
        for account in &self.accounts {
            let keys = self.repository.list(account, "").await?;
            tracing::debug!(account, count = keys.len(), "listed jobs");

            for key in keys {
                let (group, id) = split_key(&key);
                let mut job = match self.repository.get(account, group, id).await {
                    Ok(job) => job,
                    Err(e) => {
                        tracing::error!(key = %key, error = %e, "error getting job details, skipping");
                        continue;
                    }
                };

                if !job.enabled {
                    tracing::debug!(key = %key, "job is disabled, not caching");
                    continue;
                }

                job.account = account.clone();
                fresh.insert(key, job);
            }
        }

        let count = fresh.len();
        self.cache.swap(fresh);
        tracing::info!(id = %self.id, count, "done loading jobs");
        Ok(())
    }
}
