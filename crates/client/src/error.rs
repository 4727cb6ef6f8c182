use std::time::Duration;

use domain::FrameError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Codec(#[from] FrameError),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
