//! In-memory mock backends for unit testing without Redis or NATS.
//!
//! Available to unit tests unconditionally and to downstream crates with the
//! `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! minion = { path = "...", features = ["test-support"] }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::audit::{AuditShipper, Tag};
use crate::error::{Error, ErrorCode};
use crate::job::{self, Job};
use crate::lock::Locker;
use crate::queue::{JobQueue, QueuedJob};
use crate::repository::{join_key, Repository, GROUP_DELETE_LIMIT};

// ── MockLocker ───────────────────────────────────────────────────────────────

/// Admits the first caller per key; later callers lose the race.
#[derive(Clone, Default)]
pub struct MockLocker {
    held: Arc<Mutex<HashMap<String, String>>>,
    deny: Arc<AtomicBool>,
}

impl MockLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate another instance holding every lock.
    pub fn deny(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    pub fn allow(&self) {
        self.deny.store(false, Ordering::SeqCst);
    }

    /// The owner that won `key`, if anyone has.
    pub fn owner(&self, key: &str) -> Option<String> {
        self.held.lock().unwrap().get(key).cloned()
    }
}

impl Locker for MockLocker {
    async fn lock(&self, key: &str, owner: &str) -> Result<(), Error> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorCode::Conflict, "lock held by another instance"));
        }
        let mut held = self.held.lock().unwrap();
        if held.contains_key(key) {
            return Err(Error::new(ErrorCode::Conflict, "lock held by another instance"));
        }
        held.insert(key.to_string(), owner.to_string());
        Ok(())
    }
}

// ── MockQueue ────────────────────────────────────────────────────────────────

/// Scored-set queue in memory, including the backup set and the window guard.
///
/// `fetch` does not block; an empty primary set fails immediately with
/// `QueueIsEmpty`.
#[derive(Clone)]
pub struct MockQueue {
    primary: Arc<Mutex<Vec<QueuedJob>>>,
    backup: Arc<Mutex<Vec<QueuedJob>>>,
    finalized: Arc<Mutex<Vec<String>>>,
    window: i64,
    fail_enqueue: Arc<AtomicBool>,
}

impl Default for MockQueue {
    fn default() -> Self {
        Self::with_window(i64::MAX)
    }
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: i64) -> Self {
        Self {
            primary: Arc::new(Mutex::new(Vec::new())),
            backup: Arc::new(Mutex::new(Vec::new())),
            finalized: Arc::new(Mutex::new(Vec::new())),
            window,
            fail_enqueue: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_enqueue(&self) {
        self.fail_enqueue.store(true, Ordering::SeqCst);
    }

    pub fn primary_jobs(&self) -> Vec<QueuedJob> {
        self.primary.lock().unwrap().clone()
    }

    pub fn backup_jobs(&self) -> Vec<QueuedJob> {
        self.backup.lock().unwrap().clone()
    }

    /// Every id passed to `finalize`, in call order.
    pub fn finalized(&self) -> Vec<String> {
        self.finalized.lock().unwrap().clone()
    }

    fn upsert(set: &Mutex<Vec<QueuedJob>>, queued: &QueuedJob) {
        let mut set = set.lock().unwrap();
        match set.iter_mut().find(|j| j.id == queued.id) {
            Some(existing) => existing.score = queued.score,
            None => set.push(queued.clone()),
        }
    }
}

impl JobQueue for MockQueue {
    async fn enqueue(&self, queued: &QueuedJob) -> Result<(), Error> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorCode::ServiceUnavailable, "enqueue failed"));
        }
        Self::upsert(&self.primary, queued);
        Self::upsert(&self.backup, queued);
        Ok(())
    }

    async fn fetch(&self) -> Result<QueuedJob, Error> {
        let queued = {
            let mut primary = self.primary.lock().unwrap();
            let min = primary
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
                .map(|(i, _)| i);
            match min {
                Some(i) => primary.remove(i),
                None => return Err(Error::new(ErrorCode::QueueIsEmpty, "queue is empty")),
            }
        };

        if queued.score as i64 - Utc::now().timestamp() > self.window {
            Self::upsert(&self.primary, &queued);
            return Err(Error::new(
                ErrorCode::Rescheduled,
                format!("rescheduled job {}, not within window", queued.id),
            ));
        }

        Ok(queued)
    }

    async fn finalize(&self, id: &str) -> Result<(), Error> {
        self.backup.lock().unwrap().retain(|j| j.id != id);
        self.finalized.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

// ── MockRepository ───────────────────────────────────────────────────────────

/// Job catalog in a HashMap, keyed `(account, group, id)`.
#[derive(Clone, Default)]
pub struct MockRepository {
    jobs: Arc<Mutex<HashMap<(String, String, String), Job>>>,
    fail_list: Arc<AtomicBool>,
    fail_get: Arc<Mutex<Vec<String>>>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job directly, bypassing create's id regeneration.
    pub fn seed(&self, account: &str, group: &str, job: Job) {
        self.jobs.lock().unwrap().insert(
            (account.to_string(), group.to_string(), job.id.clone()),
            job,
        );
    }

    /// Make every `list` call fail.
    pub fn fail_list(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    /// Make `get` fail for one specific job id.
    pub fn fail_get(&self, id: &str) {
        self.fail_get.lock().unwrap().push(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Repository for MockRepository {
    async fn create(&self, account: &str, group: &str, mut job: Job) -> Result<Job, Error> {
        job.id = job::new_id();
        let id = job.id.clone();
        self.update(account, group, &id, job).await
    }

    async fn get(&self, account: &str, group: &str, id: &str) -> Result<Job, Error> {
        if self.fail_get.lock().unwrap().iter().any(|f| f == id) {
            return Err(Error::new(ErrorCode::ServiceUnavailable, "get failed"));
        }
        self.jobs
            .lock()
            .unwrap()
            .get(&(account.to_string(), group.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| Error::new(ErrorCode::NotFound, format!("job not found: {id}")))
    }

    async fn update(&self, account: &str, group: &str, id: &str, mut job: Job) -> Result<Job, Error> {
        if id.is_empty() || job.id != id {
            return Err(Error::new(ErrorCode::BadRequest, "job id mismatch"));
        }
        job.account = account.to_string();
        job.group = group.to_string();
        job.touch();
        self.jobs.lock().unwrap().insert(
            (account.to_string(), group.to_string(), id.to_string()),
            job.clone(),
        );
        Ok(job)
    }

    async fn list(&self, account: &str, group: &str) -> Result<Vec<String>, Error> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorCode::ServiceUnavailable, "list failed"));
        }
        let jobs = self.jobs.lock().unwrap();
        let mut keys: Vec<String> = jobs
            .keys()
            .filter(|(a, g, _)| a == account && (group.is_empty() || g == group))
            .map(|(_, g, i)| join_key(g, i))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, account: &str, group: &str, id: &str) -> Result<(), Error> {
        let mut jobs = self.jobs.lock().unwrap();
        if !id.is_empty() {
            jobs.remove(&(account.to_string(), group.to_string(), id.to_string()));
            return Ok(());
        }

        let members: Vec<_> = jobs
            .keys()
            .filter(|(a, g, _)| a == account && g == group)
            .cloned()
            .collect();
        if members.len() > GROUP_DELETE_LIMIT {
            return Err(Error::new(
                ErrorCode::LimitExceeded,
                format!("refusing to delete more than {GROUP_DELETE_LIMIT} jobs"),
            ));
        }
        for key in members {
            jobs.remove(&key);
        }
        Ok(())
    }
}

// ── MockAudit ────────────────────────────────────────────────────────────────

/// Records audit calls; optionally fails them to exercise rollback paths.
#[derive(Clone, Default)]
pub struct MockAudit {
    calls: Arc<Mutex<Vec<String>>>,
    fail: Arc<AtomicBool>,
}

impl MockAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AuditShipper for MockAudit {
    async fn create_log(
        &self,
        group: &str,
        id: &str,
        _retention_days: i64,
        _tags: &[Tag],
    ) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorCode::InternalError, "audit shipper down"));
        }
        self.calls.lock().unwrap().push(format!("create {group}/{id}"));
        Ok(())
    }

    async fn update_log(
        &self,
        group: &str,
        _retention_days: i64,
        _tags: &[Tag],
    ) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorCode::InternalError, "audit shipper down"));
        }
        self.calls.lock().unwrap().push(format!("update {group}"));
        Ok(())
    }
}
