//! Compensation stack for multi-step handlers.
//!
//! Handlers that perform several effectful steps push a compensating action
//! after each one; `abort` runs the compensations in reverse, `commit` drops
//! them. Compensations are async, so this is an explicit commit/abort value
//! rather than a destructor; a stack dropped without either is a bug and is
//! logged as such.

use std::future::Future;
use std::pin::Pin;

use crate::error::Error;

type Compensation =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send>> + Send>;

#[derive(Default)]
pub struct Rollback {
    tasks: Vec<Compensation>,
    resolved: bool,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a compensating action for the step that just succeeded.
    pub fn defer<F, Fut>(&mut self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.tasks.push(Box::new(move || Box::pin(f())));
    }

    /// The steps all succeeded; discard the compensations.
    pub fn commit(mut self) {
        self.resolved = true;
        self.tasks.clear();
    }

    /// A later step failed; run the compensations in reverse order.
    /// Individual compensation failures are logged and do not stop the rest.
    pub async fn abort(mut self) {
        self.resolved = true;
        let tasks = std::mem::take(&mut self.tasks);
        tracing::error!(count = tasks.len(), "executing rollback tasks");
        for task in tasks.into_iter().rev() {
            if let Err(e) = task().await {
                tracing::error!(error = %e, "rollback task failed, continuing rollback");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.resolved && !self.tasks.is_empty() {
            tracing::error!(
                count = self.tasks.len(),
                "rollback stack dropped without commit or abort"
            );
        }
    }
}
