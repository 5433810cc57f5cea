//! The job catalog entity and its JSON codec.
//!
//! A job is identified by `(account, group, id)`. The JSON codec validates on
//! decode: field types must match, and a present `schedule_expression` must
//! parse as a cron expression, so a job that decodes is a job the scheduler can
//! evaluate. `modified_at` is carried at second precision in UTC and encodes
//! as an RFC 3339 string (empty when unset).

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::schedule;

/// Details key naming the runner that executes the job.
pub const RUNNER_DETAIL: &str = "runner";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    pub account: String,
    pub description: String,
    pub details: HashMap<String, String>,
    pub enabled: bool,
    pub group: String,
    pub id: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub modified_by: String,
    pub name: String,
    pub schedule_expression: String,
}

impl Job {
    /// The runner name from the job details, if configured.
    pub fn runner(&self) -> Option<&str> {
        self.details.get(RUNNER_DETAIL).map(String::as_str)
    }

    /// Stamp `modified_at` with the current time at second precision.
    pub fn touch(&mut self) {
        self.modified_at = Some(truncate_second(Utc::now()));
    }
}

/// A fresh unique job id.
pub fn new_id() -> String {
    let id = uuid::Uuid::new_v4().to_string();
    tracing::debug!(job_id = %id, "generated random job id");
    id
}

fn truncate_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}

#[derive(Serialize)]
struct JobWire<'a> {
    account: &'a str,
    description: &'a str,
    details: &'a HashMap<String, String>,
    group: &'a str,
    id: &'a str,
    modified_at: String,
    modified_by: &'a str,
    name: &'a str,
    // Omitted when unset: an empty expression never parses, so writing ""
    // would make the stored job undecodable.
    #[serde(skip_serializing_if = "Option::is_none")]
    schedule_expression: Option<&'a str>,
    enabled: bool,
}

impl Serialize for Job {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let modified_at = self
            .modified_at
            .map(|t| truncate_second(t).to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();

        JobWire {
            account: &self.account,
            description: &self.description,
            details: &self.details,
            group: &self.group,
            id: &self.id,
            modified_at,
            modified_by: &self.modified_by,
            name: &self.name,
            schedule_expression: (!self.schedule_expression.is_empty())
                .then_some(self.schedule_expression.as_str()),
            enabled: self.enabled,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
struct JobRaw {
    #[serde(default)]
    account: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    details: HashMap<String, String>,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    group: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    modified_at: Option<String>,
    #[serde(default)]
    modified_by: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    schedule_expression: Option<String>,
}

impl<'de> Deserialize<'de> for Job {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = JobRaw::deserialize(deserializer)?;

        let schedule_expression = match raw.schedule_expression {
            Some(expr) => {
                schedule::parse(&expr).map_err(D::Error::custom)?;
                expr
            }
            None => String::new(),
        };

        let modified_at = match raw.modified_at.as_deref() {
            None | Some("") => None,
            Some(s) => {
                let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| {
                    D::Error::custom(format!("failed to parse modified_at '{s}': {e}"))
                })?;
                Some(truncate_second(parsed.with_timezone(&Utc)))
            }
        };

        Ok(Job {
            account: raw.account,
            description: raw.description,
            details: raw.details,
            enabled: raw.enabled,
            group: raw.group,
            id: raw.id,
            modified_at,
            modified_by: raw.modified_by,
            name: raw.name,
            schedule_expression,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Job {
        Job {
            account: "acct1".to_string(),
            description: "nightly restart".to_string(),
            details: [("runner", "dummy"), ("instance_id", "i-123")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            enabled: true,
            group: "infra".to_string(),
            id: "j1".to_string(),
            modified_at: Some("2024-01-01T05:00:00Z".parse().unwrap()),
            modified_by: "someone".to_string(),
            name: "restart".to_string(),
            schedule_expression: "@hourly".to_string(),
        }
    }

    #[test]
    fn json_round_trip_is_identity() {
        let job = fixture();
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: super::Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn modified_at_truncates_to_seconds() {
        let json = r#"{"schedule_expression": "@daily", "modified_at": "2024-01-01T05:00:00.987654Z"}"#;
        let job: super::Job = serde_json::from_str(json).unwrap();
        assert_eq!(
            job.modified_at.unwrap(),
            "2024-01-01T05:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn empty_modified_at_decodes_as_unset() {
        let json = r#"{"modified_at": ""}"#;
        let job: super::Job = serde_json::from_str(json).unwrap();
        assert!(job.modified_at.is_none());

        let encoded = serde_json::to_value(&job).unwrap();
        assert_eq!(encoded["modified_at"], "");
    }

    #[test]
    fn invalid_schedule_fails_decode() {
        let json = r#"{"schedule_expression": "broke"}"#;
        assert!(serde_json::from_str::<super::Job>(json).is_err());
    }

    #[test]
    fn empty_schedule_fails_decode() {
        let json = r#"{"schedule_expression": ""}"#;
        assert!(serde_json::from_str::<super::Job>(json).is_err());
    }

    #[test]
    fn absent_schedule_is_tolerated() {
        let json = r#"{"id": "x"}"#;
        let job: super::Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.schedule_expression, "");
    }

    #[test]
    fn schedule_less_job_round_trips() {
        let job: super::Job = serde_json::from_str(r#"{"id": "x"}"#).unwrap();
        let encoded = serde_json::to_value(&job).unwrap();
        assert!(encoded.get("schedule_expression").is_none());
        let decoded: super::Job = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn non_string_detail_value_fails_decode() {
        let json = r#"{"details": {"runner": 42}}"#;
        assert!(serde_json::from_str::<super::Job>(json).is_err());
    }

    #[test]
    fn runner_accessor() {
        let job = fixture();
        assert_eq!(job.runner(), Some("dummy"));

        let mut bare = super::Job::default();
        bare.details.clear();
        assert_eq!(bare.runner(), None);
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
