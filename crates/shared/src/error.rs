use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiErrorBody {
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            error: None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.details
            .as_deref()
            .or(self.error.as_deref())
            .filter(|message| !message.trim().is_empty())
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("push frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("push frame is missing the `type` field")]
    MissingType,
    #[error("`{kind}` frame has no payload")]
    MissingPayload { kind: String },
    #[error("`{kind}` frame payload is malformed: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}
