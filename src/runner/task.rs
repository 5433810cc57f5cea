//! Launches one-off task executions through the task API.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{required_parameter, HttpTarget};
use crate::error::{Error, ErrorCode};

/// Identifies this service as the initiator on started tasks.
const STARTED_BY: &str = "minion";

#[derive(Debug, Clone)]
pub struct TaskRunner {
    target: HttpTarget,
}

impl TaskRunner {
    pub fn new(config: &serde_json::Map<String, Value>) -> Result<Self, Error> {
        tracing::debug!("creating new task job runner");
        // Task API tokens default to the hashed form.
        Ok(Self {
            target: HttpTarget::from_config(config, true)?,
        })
    }

    /// Requires `task_cluster`, `task_name`, `task_action` (only `run`) and a
    /// positive integer `count`. POSTs `{"Count": N, "StartedBy": "minion"}`
    /// to the resolved endpoint.
    pub async fn run(
        &self,
        shutdown: &CancellationToken,
        account: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String, Error> {
        tracing::info!(account, ?parameters, "running task runner");

        let action = required_parameter(parameters, "task_action")?;
        if action != "run" {
            return Err(Error::new(
                ErrorCode::MissingDetails,
                format!("unexpected task action '{action}'"),
            ));
        }

        let cluster = required_parameter(parameters, "task_cluster")?;
        let name = required_parameter(parameters, "task_name")?;
        let count_raw = required_parameter(parameters, "count")?;
        let count: i64 = count_raw.parse().map_err(|e| {
            Error::with_cause(
                ErrorCode::PreExecutionFailure,
                "count cannot be converted to integer",
                e,
            )
        })?;
        if count <= 0 {
            return Err(Error::new(
                ErrorCode::MissingDetails,
                format!("count must be greater than zero, got {count}"),
            ));
        }

        let endpoint = self.target.resolve_endpoint(&[
            ("Account", account),
            ("Cluster", cluster),
            ("Name", name),
        ])?;
        let body = serde_json::json!({ "Count": count, "StartedBy": STARTED_BY });

        tracing::info!(cluster, name, count, "task runner running task");
        self.target
            .send(shutdown, reqwest::Method::POST, &endpoint, &body)
            .await
    }
}
