use crate::config::EndpointSettings;
use crate::errors::ClientError;
use crate::model::Subject;
use crate::registry::EngineSpec;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Raw engine output; the board validates the range before accepting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePayload {
    pub score: i64,
    pub status_label: Option<String>,
}

/// Invokes one scoring engine. Stateless and never retries on its own.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn invoke(&self, engine: &EngineSpec, subject: &Subject) -> anyhow::Result<EnginePayload>;
}

#[derive(Debug, Deserialize)]
struct EngineResponse {
    score: f64,
    #[serde(default, alias = "label", alias = "status")]
    status_label: Option<String>,
}

/// Engines served as `{base_url}/{engine.endpoint}` HTTP functions.
pub struct HttpEngineClient {
    pub base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpEngineClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            client,
        })
    }

    pub fn from_settings(settings: &EndpointSettings) -> anyhow::Result<Self> {
        let base = settings.engine_base_url.clone().ok_or_else(|| {
            ClientError::NotConfigured("endpoints.engine_base_url is not set".to_string())
        })?;
        Self::new(
            base,
            settings.api_key(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn url_for(&self, engine: &EngineSpec) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            engine.endpoint.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn invoke(
        &self,
        engine: &EngineSpec,
        subject: &Subject,
    ) -> anyhow::Result<EnginePayload> {
        let url = self.url_for(engine);

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(subject);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| ClientError::network(&url, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| String::new());
            return Err(ClientError::Status {
                target: url,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: EngineResponse = resp
            .json()
            .await
            .map_err(|e| ClientError::malformed(&url, e.to_string()))?;
        if !parsed.score.is_finite() {
            return Err(ClientError::malformed(&url, "score is not a finite number").into());
        }

        Ok(EnginePayload {
            score: parsed.score.round() as i64,
            status_label: parsed.status_label.filter(|l| !l.trim().is_empty()),
        })
    }
}
