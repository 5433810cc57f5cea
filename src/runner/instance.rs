//! Starts, stops or reboots an instance through the instance API.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{required_parameter, HttpTarget};
use crate::error::{Error, ErrorCode};

#[derive(Debug, Clone)]
pub struct InstanceRunner {
    target: HttpTarget,
}

impl InstanceRunner {
    pub fn new(config: &serde_json::Map<String, Value>) -> Result<Self, Error> {
        tracing::debug!("creating new instance job runner");
        Ok(Self {
            target: HttpTarget::from_config(config, false)?,
        })
    }

    /// Requires `instance_id` and `instance_action` (`start`, `stop`,
    /// `reboot`). PUTs `{"state": action}` to the resolved endpoint.
    pub async fn run(
        &self,
        shutdown: &CancellationToken,
        account: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String, Error> {
        tracing::info!(account, ?parameters, "running instance runner");

        let instance_id = required_parameter(parameters, "instance_id")?;
        let action = required_parameter(parameters, "instance_action")?;

        match action {
            "start" | "stop" | "reboot" => {}
            other => {
                return Err(Error::new(
                    ErrorCode::MissingDetails,
                    format!("unexpected action '{other}' for instance {instance_id}"),
                ));
            }
        }

        let endpoint = self
            .target
            .resolve_endpoint(&[("Account", account), ("InstanceID", instance_id)])?;
        let body = serde_json::json!({ "state": action });

        self.target
            .send(shutdown, reqwest::Method::PUT, &endpoint, &body)
            .await
    }
}
