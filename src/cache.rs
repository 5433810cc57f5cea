//! Process-local cache of enabled jobs.
//!
//! The loader is the only writer and replaces the whole map at the end of a
//! refresh; the scheduler and executer take the mutex just long enough to
//! clone what they need. The guard is a `std::sync::Mutex` and is never held
//! across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::job::Job;

#[derive(Debug, Default)]
pub struct JobsCache {
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone the job stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Job> {
        self.jobs.lock().expect("jobs cache poisoned").get(key).cloned()
    }

    /// Replace the cached map wholesale. Keys absent from `fresh` disappear.
    pub fn swap(&self, fresh: HashMap<String, Job>) {
        *self.jobs.lock().expect("jobs cache poisoned") = fresh;
    }

    /// Clone the current entries for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<(String, Job)> {
        self.jobs
            .lock()
            .expect("jobs cache poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("jobs cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
