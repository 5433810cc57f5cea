//! The dummy runner expands a configured text template against the account
//! and returns the result. Used for smoke tests; no side-effects.

use std::collections::HashMap;

use serde_json::Value;

use crate::config;
use crate::error::{Error, ErrorCode};
use crate::template;

#[derive(Debug, Clone)]
pub struct DummyRunner {
    template: String,
}

impl DummyRunner {
    pub fn new(config: &serde_json::Map<String, Value>) -> Result<Self, Error> {
        tracing::debug!("creating new dummy job runner");

        let template = config::optional_string(config, "template").unwrap_or_default();
        if template.is_empty() {
            return Err(Error::new(ErrorCode::BadRequest, "template cannot be empty"));
        }

        Ok(Self { template })
    }

    pub async fn run(
        &self,
        account: &str,
        parameters: &HashMap<String, String>,
    ) -> Result<String, Error> {
        tracing::info!(account, ?parameters, "running dummy runner");
        let out = template::expand(&self.template, &[("Account", account)])?;
        tracing::debug!(output = %out, "output of template");
        Ok(out)
    }
}
