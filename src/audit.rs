//! Audit-log shipper collaborator.
//!
//! The real shipper (log-group/stream creation and batched event upload)
//! lives outside this service; handlers talk to it through this interface
//! and the default implementation does nothing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Key/value metadata attached to a job's audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

#[async_trait]
pub trait AuditShipper: Send + Sync {
    /// Provision the audit log for a newly created job.
    async fn create_log(
        &self,
        group: &str,
        id: &str,
        retention_days: i64,
        tags: &[Tag],
    ) -> Result<(), Error>;

    /// Refresh retention and tags after a job update.
    async fn update_log(&self, group: &str, retention_days: i64, tags: &[Tag])
        -> Result<(), Error>;
}

/// Shipper used when no audit backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAudit;

#[async_trait]
impl AuditShipper for NoopAudit {
    async fn create_log(
        &self,
        group: &str,
        id: &str,
        _retention_days: i64,
        _tags: &[Tag],
    ) -> Result<(), Error> {
        tracing::debug!(group, id, "audit shipping disabled, skipping log creation");
        Ok(())
    }

    async fn update_log(
        &self,
        group: &str,
        _retention_days: i64,
        _tags: &[Tag],
    ) -> Result<(), Error> {
        tracing::debug!(group, "audit shipping disabled, skipping log update");
        Ok(())
    }
}
