use crate::model::RunStatus;
use thiserror::Error;

/// Run persistence errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Run not found: {id}")]
    RunNotFound { id: String },

    #[error("Run {id} is already {status}; terminal runs are immutable")]
    TerminalRun { id: String, status: RunStatus },

    #[error("Corrupt run row {id}: {detail}")]
    CorruptRow { id: String, detail: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Failures talking to the remote analyzer or an engine endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("config error: {0}")]
    NotConfigured(String),

    #[error("network error calling {target}: {detail}")]
    Network { target: String, detail: String },

    #[error("{target} returned HTTP {status}: {body}")]
    Status {
        target: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {target}: {detail}")]
    MalformedResponse { target: String, detail: String },

    #[error("engine '{engine}' returned score {score}, expected 0..=100")]
    OutOfRange { engine: String, score: i64 },
}

impl ClientError {
    pub fn network(target: impl Into<String>, e: &reqwest::Error) -> Self {
        ClientError::Network {
            target: target.into(),
            detail: e.to_string(),
        }
    }

    pub fn malformed(target: impl Into<String>, detail: impl Into<String>) -> Self {
        ClientError::MalformedResponse {
            target: target.into(),
            detail: detail.into(),
        }
    }
}
