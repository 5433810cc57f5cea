//! Job runners: the typed side-effects a scheduled job can perform.
//!
//! A runner is configured once at startup and invoked with the tenant name
//! and the job's details map. The HTTP-backed variants share target
//! resolution (fixed endpoint or `{{.Field}}` template), bearer-token
//! emission (plain or bcrypt-hashed) and response handling.

mod database;
mod dummy;
mod instance;
mod service;
mod task;

pub use database::DatabaseRunner;
pub use dummy::DummyRunner;
pub use instance::InstanceRunner;
pub use service::ServiceRunner;
pub use task::TaskRunner;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::{self, JobRunner as RunnerConfig};
use crate::error::{Error, ErrorCode};
use crate::template;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_AUTH_HEADER: &str = "X-Auth-Token";
const TOKEN_HASH_COST: u32 = 6;

#[derive(Debug, Clone)]
pub enum Runner {
    Dummy(DummyRunner),
    Instance(InstanceRunner),
    Database(DatabaseRunner),
    Service(ServiceRunner),
    Task(TaskRunner),
}

impl Runner {
    /// Construct a runner from its configured type and config map.
    pub fn new(kind: &str, config: &serde_json::Map<String, Value>) -> Result<Self, Error> {
        match kind {
            "dummy" => Ok(Self::Dummy(DummyRunner::new(config)?)),
            "instance" => Ok(Self::Instance(InstanceRunner::new(config)?)),
            "database" => Ok(Self::Database(DatabaseRunner::new(config)?)),
            "service" => Ok(Self::Service(ServiceRunner::new(config)?)),
            "task" => Ok(Self::Task(TaskRunner::new(config)?)),
            other => Err(Error::new(
                ErrorCode::BadRequest,
                format!("unknown runner type '{other}'"),
            )),
        }
    }

    /// Execute the runner for `account` with the job's details.
    pub async fn run(
        &self,
        shutdown: &CancellationToken,
        account: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String, Error> {
        if account.is_empty() {
            return Err(Error::new(ErrorCode::BadRequest, "account is required"));
        }

        match self {
            Self::Dummy(r) => r.run(account, parameters).await,
            Self::Instance(r) => r.run(shutdown, account, parameters).await,
            Self::Database(r) => r.run(shutdown, account, parameters).await,
            Self::Service(r) => r.run(shutdown, account, parameters).await,
            Self::Task(r) => r.run(shutdown, account, parameters).await,
        }
    }
}

/// Build the runner registry from configuration. Immutable after startup.
pub fn new_registry(
    configs: &HashMap<String, RunnerConfig>,
) -> Result<HashMap<String, Runner>, Error> {
    let mut registry = HashMap::new();
    for (name, cfg) in configs {
        tracing::debug!(runner = %name, kind = %cfg.kind, "configuring job runner");
        let runner = Runner::new(&cfg.kind, &cfg.config).map_err(|e| {
            Error::with_cause(
                ErrorCode::BadRequest,
                format!("invalid config for runner '{name}'"),
                e,
            )
        })?;
        registry.insert(name.clone(), runner);
    }
    Ok(registry)
}

/// Shared HTTP plumbing for the endpoint-hitting runner variants.
#[derive(Debug, Clone)]
pub(crate) struct HttpTarget {
    endpoint: String,
    endpoint_template: String,
    token: String,
    encrypt: bool,
    auth_header: String,
    client: reqwest::Client,
}

impl HttpTarget {
    pub(crate) fn from_config(
        config: &serde_json::Map<String, Value>,
        default_encrypt: bool,
    ) -> Result<Self, Error> {
        let endpoint = config::optional_string(config, "endpoint").unwrap_or_default();
        let endpoint_template = config::optional_string(config, "endpoint_template")
            .or_else(|| config::optional_string(config, "endpointTemplate"))
            .unwrap_or_default();

        if endpoint.is_empty() && endpoint_template.is_empty() {
            return Err(Error::new(
                ErrorCode::BadRequest,
                "endpoint or endpoint_template is required",
            ));
        }
        if !endpoint.is_empty() && !endpoint_template.is_empty() {
            tracing::warn!("both endpoint and endpoint_template are set, only endpoint will be used");
        }

        let token = config::optional_string(config, "token").unwrap_or_default();
        let encrypt = config
            .get("encrypt_token")
            .and_then(Value::as_bool)
            .unwrap_or(default_encrypt);
        let auth_header = config::optional_string(config, "auth_header")
            .unwrap_or_else(|| DEFAULT_AUTH_HEADER.to_string());

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::with_cause(ErrorCode::InternalError, "failed to build http client", e)
            })?;

        Ok(Self {
            endpoint,
            endpoint_template,
            token,
            encrypt,
            auth_header,
            client,
        })
    }

    /// The fixed endpoint when configured, else the expanded template.
    pub(crate) fn resolve_endpoint(&self, vars: &[(&str, &str)]) -> Result<String, Error> {
        if !self.endpoint.is_empty() {
            return Ok(self.endpoint.clone());
        }
        let endpoint = template::expand(&self.endpoint_template, vars)?;
        tracing::debug!(endpoint = %endpoint, "expanded endpoint template");
        Ok(endpoint)
    }

    /// Issue the request and return the response body.
    pub(crate) async fn send(
        &self,
        shutdown: &CancellationToken,
        method: reqwest::Method,
        endpoint: &str,
        body: &Value,
    ) -> Result<String, Error> {
        let mut request = self.client.request(method, endpoint).json(body);

        if !self.token.is_empty() {
            let value = if self.encrypt {
                bcrypt::hash(&self.token, TOKEN_HASH_COST).map_err(|e| {
                    Error::with_cause(ErrorCode::ExecutionFailure, "unable to hash token", e)
                })?
            } else {
                self.token.clone()
            };
            request = request.header(self.auth_header.as_str(), value);
        }

        let response = tokio::select! {
            _ = shutdown.cancelled() => {
                return Err(Error::new(ErrorCode::ExecutionFailure, "request cancelled"));
            }
            response = request.send() => response.map_err(|e| {
                Error::with_cause(ErrorCode::ExecutionFailure, "http request failed", e)
            })?,
        };

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            Error::with_cause(ErrorCode::PostExecutionFailure, "reading response body failed", e)
        })?;

        tracing::debug!(%status, endpoint, body = %body, "got runner response");

        if status.as_u16() >= 300 {
            return Err(Error::new(
                ErrorCode::ExecutionFailure,
                format!("unexpected response from runner api: {status}"),
            ));
        }

        Ok(body)
    }
}

/// Fetch a required job parameter.
pub(crate) fn required_parameter<'a>(
    parameters: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, Error> {
    parameters
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::new(ErrorCode::MissingDetails, format!("missing {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(json: Value) -> serde_json::Map<String, Value> {
        json.as_object().unwrap().clone()
    }

    #[test]
    fn registry_builds_configured_runners() {
        let configs = HashMap::from([
            (
                "smoke".to_string(),
                RunnerConfig {
                    kind: "dummy".to_string(),
                    config: map(serde_json::json!({"template": "hi {{.Account}}"})),
                },
            ),
            (
                "vm".to_string(),
                RunnerConfig {
                    kind: "instance".to_string(),
                    config: map(serde_json::json!({"endpoint": "http://localhost/api"})),
                },
            ),
        ]);
        let registry = new_registry(&configs).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(matches!(registry["smoke"], Runner::Dummy(_)));
        assert!(matches!(registry["vm"], Runner::Instance(_)));
    }

    #[test]
    fn registry_rejects_unknown_type() {
        let configs = HashMap::from([(
            "bad".to_string(),
            RunnerConfig {
                kind: "teleport".to_string(),
                config: serde_json::Map::new(),
            },
        )]);
        let err = new_registry(&configs).unwrap_err();
        assert!(err.is(ErrorCode::BadRequest));
        assert!(err.message().contains("bad"));
    }

    #[tokio::test]
    async fn empty_account_is_rejected_before_dispatch() {
        let runner = Runner::new("dummy", &map(serde_json::json!({"template": "x"}))).unwrap();
        let err = runner
            .run(&CancellationToken::new(), "", &HashMap::new())
            .await
            .unwrap_err();
        assert!(err.is(ErrorCode::BadRequest));
    }

    #[test]
    fn http_target_requires_an_endpoint() {
        let err = HttpTarget::from_config(&serde_json::Map::new(), false).unwrap_err();
        assert!(err.is(ErrorCode::BadRequest));
        assert!(err.message().contains("endpoint"));
    }

    #[test]
    fn fixed_endpoint_wins_over_template() {
        let target = HttpTarget::from_config(
            &map(serde_json::json!({
                "endpoint": "http://fixed/api",
                "endpoint_template": "http://templated/{{.Account}}"
            })),
            false,
        )
        .unwrap();
        assert_eq!(
            target.resolve_endpoint(&[("Account", "a")]).unwrap(),
            "http://fixed/api"
        );
    }

    #[test]
    fn template_endpoint_expands_fields() {
        let target = HttpTarget::from_config(
            &map(serde_json::json!({
                "endpoint_template": "http://api/{{.Account}}/things/{{.InstanceID}}"
            })),
            false,
        )
        .unwrap();
        assert_eq!(
            target
                .resolve_endpoint(&[("Account", "a1"), ("InstanceID", "i-9")])
                .unwrap(),
            "http://api/a1/things/i-9"
        );
    }

    #[test]
    fn camel_case_template_key_is_accepted() {
        let target = HttpTarget::from_config(
            &map(serde_json::json!({"endpointTemplate": "http://api/{{.Account}}"})),
            false,
        )
        .unwrap();
        assert_eq!(
            target.resolve_endpoint(&[("Account", "a")]).unwrap(),
            "http://api/a"
        );
    }

    #[test]
    fn missing_parameter_is_missing_details() {
        let params = HashMap::new();
        let err = required_parameter(&params, "instance_id").unwrap_err();
        assert!(err.is(ErrorCode::MissingDetails));
        assert!(err.message().contains("instance_id"));
    }
}
