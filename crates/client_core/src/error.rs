use shared::error::FrameError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("server responded with status {status}: {details}")]
    Server { status: u16, details: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("live update channel closed: {0}")]
    ChannelClosed(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub fn server(status: u16, details: impl Into<String>) -> Self {
        Self::Server {
            status,
            details: details.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Unable to reach the call server.".to_string(),
            Self::Server { details, .. } => details.clone(),
            Self::Protocol(message) => message.clone(),
            Self::ChannelClosed(_) => {
                "Live updates disconnected. Reconnecting...".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::server(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Self::Protocol(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<FrameError> for ClientError {
    fn from(err: FrameError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match &err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                Self::ChannelClosed(err.to_string())
            }
            _ => Self::Network(err.to_string()),
        }
    }
}
