use crate::config::EndpointSettings;
use crate::errors::ClientError;
use crate::model::{InputSnapshot, RunResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// What the remote analyzer said when a job was submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerAck {
    /// Finished inline; the result is final.
    Completed(RunResult),
    /// Accepted; the remote worker will write the run record later.
    Queued,
    /// Refused before any job existed (validation, quota, auth).
    Rejected(String),
    /// Ran inline and reported failure.
    Failed(String),
}

/// The expensive multi-field analysis. `Err` means the call never reached a job.
#[async_trait]
pub trait RemoteAnalyzer: Send + Sync {
    async fn invoke(&self, run_id: &str, snapshot: &InputSnapshot) -> anyhow::Result<AnalyzerAck>;

    fn provider_name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct AnalyzerResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    error: Option<String>,
}

impl AnalyzerResponse {
    fn into_ack(self) -> AnalyzerAck {
        let error = self
            .error
            .unwrap_or_else(|| "analyzer reported failure without detail".to_string());
        if !self.success {
            return AnalyzerAck::Rejected(error);
        }
        if let Some(result) = self.result {
            return AnalyzerAck::Completed(result);
        }
        match self.status.as_deref() {
            Some("failed") => AnalyzerAck::Failed(error),
            _ => AnalyzerAck::Queued,
        }
    }
}

/// Analyzer exposed as an HTTP function taking `{run_id, snapshot}`.
pub struct HttpAnalyzer {
    pub url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpAnalyzer {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            api_key,
            client,
        })
    }

    pub fn from_settings(settings: &EndpointSettings) -> anyhow::Result<Self> {
        let url = settings.analyzer_url.clone().ok_or_else(|| {
            ClientError::NotConfigured("endpoints.analyzer_url is not set".to_string())
        })?;
        Self::new(
            url,
            settings.api_key(),
            Duration::from_secs(settings.timeout_secs),
        )
    }
}

#[async_trait]
impl RemoteAnalyzer for HttpAnalyzer {
    async fn invoke(&self, run_id: &str, snapshot: &InputSnapshot) -> anyhow::Result<AnalyzerAck> {
        let body = json!({
            "run_id": run_id,
            "snapshot": snapshot,
        });

        let mut req = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::network(&self.url, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| String::new());
            return Err(ClientError::Status {
                target: self.url.clone(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: AnalyzerResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::malformed(&self.url, e.to_string()))?;
        Ok(parsed.into_ack())
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}
