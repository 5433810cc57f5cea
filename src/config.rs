//! Service configuration.
//!
//! The configuration is a JSON document read from a file path or from the
//! `MINION_CONFIG` environment variable, which may hold either raw JSON or
//! base64-encoded JSON. `org` is required and namespaces every shared key
//! (queue sets, lock keys, catalog prefix); there are no process-wide
//! globals; the loaded `Config` is threaded through the constructors.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, ErrorCode};

pub const DEFAULT_LISTEN_ADDRESS: &str = ":8080";

/// Environment variable holding the configuration document (raw or base64).
pub const CONFIG_ENV: &str = "MINION_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub accounts: HashMap<String, Account>,
    pub jobs_repository: JobsRepository,
    #[serde(default)]
    pub job_runners: HashMap<String, JobRunner>,
    #[serde(default)]
    pub listen_address: String,
    pub lock_provider: Provider,
    pub queue_provider: Provider,
    #[serde(default)]
    pub log_provider: Option<LogProvider>,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub log_level: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub on_retry_exhaustion: ExhaustionPolicy,
}

/// Per-account settings: the runners a tenant is allowed to use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub runners: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsRepository {
    #[serde(rename = "type")]
    pub kind: String,
    pub refresh_interval: String,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRunner {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub ttl: Option<String>,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

/// Credentials for the audit-log shipper collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogProvider {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub akid: String,
    #[serde(default)]
    pub secret: String,
}

/// What the executer does with the backup entry after retries are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExhaustionPolicy {
    /// Remove from the backup set, same as a successful run.
    #[default]
    Finalize,
    /// Leave the backup entry for an external requeuer to pick up.
    LeaveInBackup,
}

impl Config {
    /// Read the configuration from `MINION_CONFIG` when set, else from `path`.
    pub fn load(path: &str) -> Result<Self, Error> {
        let bytes = match std::env::var(CONFIG_ENV) {
            Ok(raw) if !raw.is_empty() => {
                tracing::info!("reading configuration from {CONFIG_ENV} environment");
                match base64::engine::general_purpose::STANDARD.decode(raw.trim()) {
                    Ok(decoded) => decoded,
                    Err(_) => {
                        tracing::info!("{CONFIG_ENV} is not base64 encoded");
                        raw.into_bytes()
                    }
                }
            }
            _ => {
                tracing::info!(path, "reading configuration from file");
                std::fs::read(path).map_err(|e| {
                    Error::with_cause(
                        ErrorCode::BadRequest,
                        format!("unable to read config file '{path}'"),
                        e,
                    )
                })?
            }
        };

        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let config: Config = serde_json::from_slice(bytes).map_err(|e| {
            Error::with_cause(ErrorCode::BadRequest, "unable to decode configuration", e)
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.org.is_empty() {
            return Err(Error::new(
                ErrorCode::BadRequest,
                "'org' cannot be empty in the configuration",
            ));
        }
        Ok(())
    }

    pub fn listen_address(&self) -> &str {
        if self.listen_address.is_empty() {
            DEFAULT_LISTEN_ADDRESS
        } else {
            &self.listen_address
        }
    }
}

/// Read a provider config field that may be a JSON string or number.
///
/// `port` and `database` historically appear in both representations; any
/// other type is rejected outright.
pub fn string_or_number(
    config: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<Option<String>, Error> {
    match config.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(Error::new(
            ErrorCode::BadRequest,
            format!("'{field}' must be a string or a number, got: {other}"),
        )),
    }
}

/// Read a required string field from a provider config map.
pub fn required_string(
    config: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, Error> {
    match config.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(Error::new(
            ErrorCode::BadRequest,
            format!("'{field}' is required"),
        )),
        Some(other) => Err(Error::new(
            ErrorCode::BadRequest,
            format!("'{field}' must be a string, got: {other}"),
        )),
    }
}

/// Read an optional string field from a provider config map.
pub fn optional_string(config: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    config
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Parse duration strings of the `90s` / `2m` / `1h` form.
pub fn parse_duration(s: &str) -> Result<Duration, Error> {
    let s = s.trim();
    let bad = || {
        Error::new(
            ErrorCode::BadRequest,
            format!("'{s}' is not a valid duration (expected e.g. 90s, 2m, 1h)"),
        )
    };

    let unit = s.chars().last().ok_or_else(|| bad())?;
    let value = &s[..s.len() - unit.len_utf8()];
    let n: u64 = value.parse().map_err(|_| bad())?;
    match unit {
        's' => Ok(Duration::from_secs(n)),
        'm' => Ok(Duration::from_secs(n * 60)),
        'h' => Ok(Duration::from_secs(n * 3600)),
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> &'static str {
        r#"{
            "org": "tst",
            "accounts": {"acct1": {"runners": ["dummy"]}},
            "jobsRepository": {"type": "kv", "refreshInterval": "60s",
                               "config": {"servers": "nats://localhost:4222"}},
            "queueProvider": {"type": "redis",
                              "config": {"host": "127.0.0.1", "port": 6379, "database": "2", "window": 120}},
            "lockProvider": {"type": "redis", "ttl": "2m",
                             "config": {"host": "127.0.0.1", "port": "6379", "database": 0}},
            "jobRunners": {"dummy": {"type": "dummy", "config": {"template": "hi {{.Account}}"}}},
            "token": "psk",
            "logLevel": "debug",
            "listenAddress": ":9000"
        }"#
    }

    #[test]
    fn decodes_full_document() {
        let c = Config::from_slice(minimal().as_bytes()).unwrap();
        assert_eq!(c.org, "tst");
        assert_eq!(c.listen_address(), ":9000");
        assert_eq!(c.accounts["acct1"].runners, vec!["dummy"]);
        assert_eq!(c.jobs_repository.kind, "kv");
        assert_eq!(c.jobs_repository.refresh_interval, "60s");
        assert_eq!(c.job_runners["dummy"].kind, "dummy");
        assert_eq!(c.lock_provider.ttl.as_deref(), Some("2m"));
        assert_eq!(c.on_retry_exhaustion, ExhaustionPolicy::Finalize);
    }

    #[test]
    fn empty_org_is_rejected() {
        let json = r#"{
            "org": "",
            "jobsRepository": {"type": "kv", "refreshInterval": "60s"},
            "queueProvider": {"type": "redis"},
            "lockProvider": {"type": "redis"}
        }"#;
        let err = Config::from_slice(json.as_bytes()).unwrap_err();
        assert!(err.is(ErrorCode::BadRequest));
        assert!(err.message().contains("org"));
    }

    #[test]
    fn listen_address_defaults() {
        let json = r#"{
            "org": "tst",
            "jobsRepository": {"type": "kv", "refreshInterval": "60s"},
            "queueProvider": {"type": "redis"},
            "lockProvider": {"type": "redis"}
        }"#;
        let c = Config::from_slice(json.as_bytes()).unwrap();
        assert_eq!(c.listen_address(), ":8080");
    }

    #[test]
    fn exhaustion_policy_decodes() {
        let json = r#"{
            "org": "tst",
            "jobsRepository": {"type": "kv", "refreshInterval": "60s"},
            "queueProvider": {"type": "redis"},
            "lockProvider": {"type": "redis"},
            "onRetryExhaustion": "leaveInBackup"
        }"#;
        let c = Config::from_slice(json.as_bytes()).unwrap();
        assert_eq!(c.on_retry_exhaustion, ExhaustionPolicy::LeaveInBackup);
    }

    #[test]
    fn port_accepts_string_and_number() {
        let c = Config::from_slice(minimal().as_bytes()).unwrap();
        assert_eq!(
            string_or_number(&c.queue_provider.config, "port").unwrap(),
            Some("6379".to_string())
        );
        assert_eq!(
            string_or_number(&c.lock_provider.config, "port").unwrap(),
            Some("6379".to_string())
        );
        assert_eq!(
            string_or_number(&c.queue_provider.config, "database").unwrap(),
            Some("2".to_string())
        );
        assert_eq!(
            string_or_number(&c.lock_provider.config, "database").unwrap(),
            Some("0".to_string())
        );
    }

    #[test]
    fn port_rejects_other_types() {
        let mut config = serde_json::Map::new();
        config.insert("port".to_string(), serde_json::json!([6379]));
        let err = string_or_number(&config, "port").unwrap_err();
        assert!(err.is(ErrorCode::BadRequest));
    }

    #[test]
    fn missing_field_is_none() {
        let config = serde_json::Map::new();
        assert_eq!(string_or_number(&config, "port").unwrap(), None);
    }

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("tens").is_err());
    }
}
