//! Scales a container service to a desired count through the service API.

use std::collections::HashMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{required_parameter, HttpTarget};
use crate::error::{Error, ErrorCode};

#[derive(Debug, Clone)]
pub struct ServiceRunner {
    target: HttpTarget,
}

impl ServiceRunner {
    pub fn new(config: &serde_json::Map<String, Value>) -> Result<Self, Error> {
        tracing::debug!("creating new service job runner");
        Ok(Self {
            target: HttpTarget::from_config(config, false)?,
        })
    }

    /// Requires `service_cluster`, `service_name`, `service_action` (only
    /// `scale`) and an integer `desired_count`. PUTs
    /// `{"Service": {"DesiredCount": N}}` to the resolved endpoint.
    pub async fn run(
        &self,
        shutdown: &CancellationToken,
        account: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String, Error> {
        tracing::info!(account, ?parameters, "running service runner");

        let action = required_parameter(parameters, "service_action")?;
        if action != "scale" {
            return Err(Error::new(
                ErrorCode::MissingDetails,
                format!("unexpected service action '{action}'"),
            ));
        }

        let cluster = required_parameter(parameters, "service_cluster")?;
        let name = required_parameter(parameters, "service_name")?;
        let count_raw = required_parameter(parameters, "desired_count")?;
        let desired_count: i64 = count_raw.parse().map_err(|e| {
            Error::with_cause(
                ErrorCode::PreExecutionFailure,
                "desired count cannot be converted to integer",
                e,
            )
        })?;

        let endpoint = self.target.resolve_endpoint(&[
            ("Account", account),
            ("Cluster", cluster),
            ("Name", name),
        ])?;
        let body = serde_json::json!({ "Service": { "DesiredCount": desired_count } });

        tracing::debug!(cluster, name, desired_count, "scaling service");
        self.target
            .send(shutdown, reqwest::Method::PUT, &endpoint, &body)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ServiceRunner {
        let config = serde_json::json!({
            "endpoint_template": "http://api/{{.Account}}/clusters/{{.Cluster}}/services/{{.Name}}"
        });
        ServiceRunner::new(config.as_object().unwrap()).unwrap()
    }

    fn scale_params(count: &str) -> HashMap<String, String> {
        [
            ("service_action", "scale"),
            ("service_cluster", "web"),
            ("service_name", "frontend"),
            ("desired_count", count),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn only_scale_is_allowed() {
        let mut params = scale_params("2");
        params.insert("service_action".to_string(), "restart".to_string());
        let err = runner()
            .run(&CancellationToken::new(), "acct", &params)
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::MissingDetails));
    }

    #[tokio::test]
    async fn non_integer_count_is_pre_execution_failure() {
        let err = runner()
            .run(&CancellationToken::new(), "acct", &scale_params("lots"))
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::PreExecutionFailure));
    }

    #[tokio::test]
    async fn missing_cluster_fails() {
        let mut params = scale_params("2");
        params.remove("service_cluster");
        let err = runner()
            .run(&CancellationToken::new(), "acct", &params)
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::MissingDetails));
        assert!(err.message().contains("service_cluster"));
    }
}
