//! Client for the remote-job service used by the Remote-Job Workflow (§4.5).
//!
//! Covers submission, polling, and per-task error lookup. The retry and
//! poll-loop orchestration itself lives in the gateway; this module only
//! speaks the wire protocol.

use crate::util::from_reqwest;
use rsa_domain::error::{Error, Result};
use serde_json::{Map, Value};

#[async_trait::async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Submit one data dict as a single task. Returns the raw response text;
    /// callers compare it against [`rsa_domain::remote_job::SUBMIT_SUCCESS_MARKER`].
    async fn submit(&self, data: &Map<String, Value>) -> Result<String>;

    /// Poll the status of a project's tasks. Returns the raw response text;
    /// callers classify it with [`rsa_domain::remote_job::classify_poll_response`].
    async fn poll(&self, project_name: &str) -> Result<String>;

    /// Load the `error_message` recorded for a task, if any.
    async fn error_message(&self, task_name: &str) -> Result<Option<String>>;
}

pub struct HttpRemoteJobClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemoteJobClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl RemoteJobClient for HttpRemoteJobClient {
    async fn submit(&self, data: &Map<String, Value>) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/submit", self.base_url))
            .json(data)
            .send()
            .await
            .map_err(from_reqwest)?;
        resp.text().await.map_err(from_reqwest)
    }

    async fn poll(&self, project_name: &str) -> Result<String> {
        let resp = self
            .client
            .get(format!("{}/status/{project_name}", self.base_url))
            .send()
            .await
            .map_err(from_reqwest)?;
        resp.text().await.map_err(from_reqwest)
    }

    async fn error_message(&self, task_name: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(format!("{}/tasks/{task_name}/error", self.base_url))
            .send()
            .await
            .map_err(from_reqwest)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::Provider {
                provider: "remote_job".into(),
                message: format!("HTTP {}", resp.status()),
            });
        }
        let text = resp.text().await.map_err(from_reqwest)?;
        if text.trim().is_empty() || text.trim() == "null" {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}
