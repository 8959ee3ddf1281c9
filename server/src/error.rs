use thiserror::Error;

/// Errors that stop the server itself. Per-connection failures never end up here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
