//! The durable job catalog contract.
//!
//! Implementations store one JSON-encoded job per object under
//! `{prefix}/{org}/{account}/{group}/{id}`. The trait is the seam the loader
//! and the HTTP handlers are written against; tests swap in the in-memory
//! mock.

use std::future::Future;

use crate::error::Error;
use crate::job::Job;

/// Upper bound on a whole-group delete, to guard against unbounded batches.
pub const GROUP_DELETE_LIMIT: usize = 1000;

pub trait Repository: Send + Sync + Clone + 'static {
    /// Store a new job under a freshly generated id. The id on the passed job
    /// is ignored and overwritten; `modified_at` is stamped.
    fn create(
        &self,
        account: &str,
        group: &str,
        job: Job,
    ) -> impl Future<Output = Result<Job, Error>> + Send;

    /// Fetch a single job. `NotFound` when no such object exists.
    fn get(
        &self,
        account: &str,
        group: &str,
        id: &str,
    ) -> impl Future<Output = Result<Job, Error>> + Send;

    /// Overwrite a stored job. Fails with `BadRequest` when `job.id != id`;
    /// `modified_at` is stamped.
    fn update(
        &self,
        account: &str,
        group: &str,
        id: &str,
        job: Job,
    ) -> impl Future<Output = Result<Job, Error>> + Send;

    /// List catalog keys for an account, relative to the account prefix
    /// (`group/id`, or bare `id` for group-less jobs). An empty `group` lists
    /// all groups; a non-empty one restricts to that group.
    fn list(
        &self,
        account: &str,
        group: &str,
    ) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Delete one job, or every job in the group when `id` is empty,
    /// capped at [`GROUP_DELETE_LIMIT`] (`LimitExceeded` beyond that).
    fn delete(
        &self,
        account: &str,
        group: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Split a listed catalog key into `(group, id)`.
///
/// `"a/b"` → `("a", "b")`; a single segment is an id with no group.
pub fn split_key(key: &str) -> (&str, &str) {
    match key.split_once('/') {
        Some((group, id)) => (group, id),
        None => ("", key),
    }
}

/// The cache/queue key for a job: `group/id`, or bare `id` without a group.
pub fn join_key(group: &str, id: &str) -> String {
    if group.is_empty() {
        id.to_string()
    } else {
        format!("{group}/{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_two_segments() {
        assert_eq!(split_key("infra/j1"), ("infra", "j1"));
    }

    #[test]
    fn split_single_segment_has_empty_group() {
        assert_eq!(split_key("j1"), ("", "j1"));
    }

    #[test]
    fn split_keeps_extra_segments_in_id() {
        assert_eq!(split_key("a/b/c"), ("a", "b/c"));
    }

    #[test]
    fn join_round_trips() {
        assert_eq!(join_key("infra", "j1"), "infra/j1");
        assert_eq!(join_key("", "j1"), "j1");
        let joined = join_key("infra", "j1");
        let (g, i) = split_key(&joined);
        assert_eq!((g, i), ("infra", "j1"));
    }
}
