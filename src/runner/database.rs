//! Starts or stops a database instance through the database API.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{required_parameter, HttpTarget};
use crate::error::{Error, ErrorCode};

#[derive(Debug, Clone)]
pub struct DatabaseRunner {
    target: HttpTarget,
}

impl DatabaseRunner {
    pub fn new(config: &serde_json::Map<String, Value>) -> Result<Self, Error> {
        tracing::debug!("creating new database job runner");
        Ok(Self {
            target: HttpTarget::from_config(config, false)?,
        })
    }

    /// Requires `instance_id` and `database_action` (`start`, `stop`).
    /// PUTs `{"state": action}` to the resolved endpoint.
    pub async fn run(
        &self,
        shutdown: &CancellationToken,
        account: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String, Error> {
        tracing::info!(account, ?parameters, "running database runner");

        let instance_id = required_parameter(parameters, "instance_id")?;
        let action = required_parameter(parameters, "database_action")?;

        match action {
            "start" | "stop" => {}
            other => {
                return Err(Error::new(
                    ErrorCode::MissingDetails,
                    format!("unexpected action '{other}' for database {instance_id}"),
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

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> DatabaseRunner {
        let config = serde_json::json!({
            "endpoint_template": "http://api/{{.Account}}/databases/{{.InstanceID}}"
        });
        DatabaseRunner::new(config.as_object().unwrap()).unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn reboot_is_not_a_database_action() {
        let err = runner()
            .run(
                &CancellationToken::new(),
                "acct",
                &params(&[("instance_id", "db-1"), ("database_action", "reboot")]),
            )
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::MissingDetails));
    }

    #[tokio::test]
    async fn missing_parameters_fail() {
        let err = runner()
            .run(&CancellationToken::new(), "acct", &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::MissingDetails));
    }
}
